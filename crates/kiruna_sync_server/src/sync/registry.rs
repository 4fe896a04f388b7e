use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// A serialized text frame queued for one connection.
///
/// Cloning shares the underlying bytes, so every recipient of a broadcast
/// gets the identical payload.
pub type Frame = Utf8Bytes;

/// Outbound slot of a live connection, read by its socket task.
///
/// Each snapshot replaces the previous one, so a connection that stops
/// reading holds at most the latest frame.
pub type FrameSender = watch::Sender<Option<Frame>>;

/// Read side of a [`FrameSender`].
pub type FrameReceiver = watch::Receiver<Option<Frame>>;

/// Identifies one live connection (one browser tab)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of currently open connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, FrameSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns false (and keeps the existing sender) if the
    /// id is already registered.
    pub fn register(&mut self, id: ConnectionId, sender: FrameSender) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(id, sender);
        true
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn unregister(&mut self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Hand a frame to one connection if it is still writable.
    pub fn send_to(&self, id: &ConnectionId, frame: Frame) -> bool {
        match self.connections.get(id) {
            Some(sender) => deliver(id, sender, frame),
            None => false,
        }
    }

    /// Hand the same frame to every writable connection.
    ///
    /// Connections whose socket task has already gone away are skipped; their
    /// own disconnect handling unregisters them. Returns the number of
    /// connections the frame was handed to.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        self.connections
            .iter()
            .filter(|(id, sender)| deliver(id, sender, frame.clone()))
            .count()
    }
}

fn deliver(id: &ConnectionId, sender: &FrameSender, frame: Frame) -> bool {
    if sender.is_closed() {
        debug!("Skipping closed connection {}", id);
        return false;
    }
    sender.send_replace(Some(frame));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> (FrameSender, FrameReceiver) {
        watch::channel(None)
    }

    fn take(rx: &mut FrameReceiver) -> Option<String> {
        if !rx.has_changed().unwrap_or(false) {
            return None;
        }
        rx.borrow_and_update()
            .as_ref()
            .map(|frame| frame.as_str().to_string())
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (tx1, mut rx1) = slot();
        let (tx2, mut rx2) = slot();

        assert!(registry.register(id, tx1));
        assert!(!registry.register(id, tx2));
        assert_eq!(registry.len(), 1);

        // The original sender is kept.
        registry.send_to(&id, Frame::from("hello"));
        assert_eq!(take(&mut rx1).as_deref(), Some("hello"));
        assert_eq!(take(&mut rx2), None);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (tx, _rx) = slot();
        registry.register(id, tx);

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(!registry.unregister(&ConnectionId::new()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_skips_closed_connections() {
        let mut registry = ConnectionRegistry::new();
        let (open_tx, mut open_rx) = slot();
        let (closed_tx, closed_rx) = slot();
        registry.register(ConnectionId::new(), open_tx);
        registry.register(ConnectionId::new(), closed_tx);
        drop(closed_rx);

        let delivered = registry.broadcast(&Frame::from("snapshot"));

        assert_eq!(delivered, 1);
        assert_eq!(take(&mut open_rx).as_deref(), Some("snapshot"));
        // Closed connections stay registered until their own close is handled.
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unread_frames_are_replaced() {
        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = slot();
        registry.register(ConnectionId::new(), tx);

        for i in 0..100 {
            registry.broadcast(&Frame::from(format!("snapshot {i}")));
        }

        assert_eq!(take(&mut rx).as_deref(), Some("snapshot 99"));
        assert_eq!(take(&mut rx), None);
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to(&ConnectionId::new(), Frame::from("x")));
    }
}
