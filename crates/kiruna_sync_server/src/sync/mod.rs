mod connection;
mod hub;
mod registry;

pub use connection::ClientConnection;
pub use hub::{HubCommand, HubError, HubHandle, HubStats, SyncHub};
pub use registry::{ConnectionId, ConnectionRegistry, Frame, FrameReceiver, FrameSender};
