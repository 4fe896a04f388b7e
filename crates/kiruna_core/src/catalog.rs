//! Collaborator interface to the external Document/Link catalog.
//!
//! The sync subsystem never owns documents or links; it only stores
//! positions keyed by their ids. An [`ElementCatalog`] tells the store which
//! ids still exist so orphaned positions can be pruned on request.

use serde::Deserialize;
use std::collections::HashSet;

use crate::types::{ElementId, ElementType};

/// Answers whether an element still exists in the document catalog.
pub trait ElementCatalog {
    /// Whether the element with `id` still exists.
    fn contains(&self, element_type: ElementType, id: &ElementId) -> bool;
}

/// A catalog snapshot given as explicit id sets.
///
/// This is what the REST layer posts when it asks the hub to prune: the ids
/// of every live document (`nodes`) and link (`connections`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnownElements {
    /// Ids of live documents
    #[serde(default)]
    pub nodes: HashSet<ElementId>,
    /// Ids of live links
    #[serde(default)]
    pub connections: HashSet<ElementId>,
}

impl KnownElements {
    /// An empty catalog; pruning against it removes everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live element id.
    pub fn with(mut self, element_type: ElementType, id: impl Into<ElementId>) -> Self {
        match element_type {
            ElementType::Nodes => self.nodes.insert(id.into()),
            ElementType::Connections => self.connections.insert(id.into()),
        };
        self
    }
}

impl ElementCatalog for KnownElements {
    fn contains(&self, element_type: ElementType, id: &ElementId) -> bool {
        match element_type {
            ElementType::Nodes => self.nodes.contains(id),
            ElementType::Connections => self.connections.contains(id),
        }
    }
}
