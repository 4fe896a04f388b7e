#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Catalog of live documents and links (for pruning orphans)
pub mod catalog;

/// Error (common error types)
pub mod error;

/// Wire protocol (message classification and snapshots)
pub mod protocol;

/// Configuration store (durable positions)
pub mod store;

/// Positions, element ids and the graph configuration
pub mod types;

/// WebSocket client adapter
#[cfg(feature = "native-sync")]
pub mod client;

pub use catalog::{ElementCatalog, KnownElements};
pub use error::{KirunaError, Result};
pub use protocol::{Classified, SyncMessage, build_snapshot, classify};
pub use store::{ConfigStore, JsonFileStore, MemoryStore, StoreResult};
pub use types::{ElementId, ElementType, ElementUpdate, GraphConfiguration, Position};

#[cfg(feature = "native-sync")]
pub use client::{SyncClient, SyncStatus};
