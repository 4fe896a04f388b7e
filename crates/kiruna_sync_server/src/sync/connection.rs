use super::{ConnectionId, Frame, FrameReceiver, HubHandle};
use tokio::sync::watch;
use tracing::debug;

/// Represents a connected client
pub struct ClientConnection {
    pub id: ConnectionId,
    hub: HubHandle,
    frames_rx: FrameReceiver,
}

impl ClientConnection {
    /// Register a new connection with the hub.
    ///
    /// The hub hands it the current configuration straight away.
    pub fn open(hub: HubHandle) -> Self {
        let id = ConnectionId::new();
        let (frames_tx, frames_rx) = watch::channel(None);
        if !hub.connect(id, frames_tx) {
            debug!("Hub stopped before connection {} could register", id);
        }

        Self { id, hub, frames_rx }
    }

    /// Handle an incoming text frame from the client
    pub fn handle_message(&self, raw: String) {
        self.hub.message(self.id, raw);
    }

    /// Wait for the newest snapshot this client has not sent yet.
    ///
    /// Snapshots published while the socket was busy are skipped in favour of
    /// the latest one. Returns `None` once the hub has dropped this
    /// connection's sender.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            self.frames_rx.changed().await.ok()?;
            if let Some(frame) = self.frames_rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
        debug!("Client connection {} dropped", self.id);
    }
}
