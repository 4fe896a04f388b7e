//! Core types for graph-layout synchronization.
//!
//! This module defines the positions, element identifiers and the aggregate
//! [`GraphConfiguration`] shared by the store, the wire protocol and the
//! client adapter.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::KirunaError;

/// A 2D offset for a diagram node or a link's curve control point.
///
/// Whether the values are normalized or pixels is up to the caller; the
/// store never interprets them. Positions are replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
}

impl Position {
    /// Create a position from its coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Which sub-map of a [`GraphConfiguration`] an element lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ElementType {
    /// Document nodes in the diagram
    Nodes,
    /// Control points of links between documents
    Connections,
}

impl ElementType {
    /// Every element type, in persisted order.
    pub const ALL: [ElementType; 2] = [ElementType::Nodes, ElementType::Connections];

    /// The wire and persisted name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Nodes => "nodes",
            ElementType::Connections => "connections",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = KirunaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nodes" => Ok(ElementType::Nodes),
            "connections" => Ok(ElementType::Connections),
            other => Err(KirunaError::InvalidElementType(other.to_string())),
        }
    }
}

/// Opaque identifier of a document or link, owned by the document catalog.
///
/// Always stored and serialized as a string. When deserializing, integer
/// ids are accepted and stringified, since the catalog hands out numeric
/// ids and browsers send them unquoted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct ElementId(String);

impl ElementId {
    /// Wrap an id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ElementId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(ElementId(s)),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => {
                Ok(ElementId(n.to_string()))
            }
            other => Err(D::Error::custom(format!(
                "expected string or integer element id, got {}",
                other
            ))),
        }
    }
}

/// Persisted positions of every element in the relationship diagram.
///
/// Both sub-maps are always present, possibly empty; a document missing
/// either key deserializes with an empty map in its place. Ordered maps keep
/// the encoded form deterministic, so equal configurations encode to the
/// same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GraphConfiguration {
    /// Positions of document nodes
    #[serde(default)]
    pub nodes: BTreeMap<ElementId, Position>,
    /// Control points of links
    #[serde(default)]
    pub connections: BTreeMap<ElementId, Position>,
}

impl GraphConfiguration {
    /// Create a configuration with empty sub-maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sub-map holding elements of `element_type`.
    pub fn elements(&self, element_type: ElementType) -> &BTreeMap<ElementId, Position> {
        match element_type {
            ElementType::Nodes => &self.nodes,
            ElementType::Connections => &self.connections,
        }
    }

    /// Mutable access to the sub-map holding elements of `element_type`.
    pub fn elements_mut(
        &mut self,
        element_type: ElementType,
    ) -> &mut BTreeMap<ElementId, Position> {
        match element_type {
            ElementType::Nodes => &mut self.nodes,
            ElementType::Connections => &mut self.connections,
        }
    }

    /// Current position of an element, if it has one.
    pub fn get(&self, element_type: ElementType, id: &ElementId) -> Option<Position> {
        self.elements(element_type).get(id).copied()
    }

    /// Set the position of an element, replacing any previous value.
    ///
    /// Returns the replaced position, if there was one.
    pub fn set(
        &mut self,
        element_type: ElementType,
        id: ElementId,
        position: Position,
    ) -> Option<Position> {
        self.elements_mut(element_type).insert(id, position)
    }

    /// Remove the position of an element. Absent ids are not an error.
    pub fn remove(&mut self, element_type: ElementType, id: &ElementId) -> Option<Position> {
        self.elements_mut(element_type).remove(id)
    }

    /// Total number of positioned elements across both sub-maps.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.connections.len()
    }

    /// No element has a position.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    /// Drop every element for which `keep` returns false.
    ///
    /// Returns the number of removed entries.
    pub fn retain(&mut self, mut keep: impl FnMut(ElementType, &ElementId) -> bool) -> usize {
        let before = self.len();
        for element_type in ElementType::ALL {
            self.elements_mut(element_type)
                .retain(|id, _| keep(element_type, id));
        }
        before - self.len()
    }
}

/// A validated request to move one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementUpdate {
    /// Sub-map the element lives in
    pub element_type: ElementType,
    /// Element being moved
    pub id: ElementId,
    /// New position, replacing the old one
    pub position: Position,
}

impl ElementUpdate {
    /// Create an update for any element type.
    pub fn new(element_type: ElementType, id: impl Into<ElementId>, position: Position) -> Self {
        Self {
            element_type,
            id: id.into(),
            position,
        }
    }

    /// Move a document node.
    pub fn node(id: impl Into<ElementId>, x: f64, y: f64) -> Self {
        Self::new(ElementType::Nodes, id, Position::new(x, y))
    }

    /// Move a link control point.
    pub fn connection(id: impl Into<ElementId>, x: f64, y: f64) -> Self {
        Self::new(ElementType::Connections, id, Position::new(x, y))
    }
}
