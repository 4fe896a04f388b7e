//! WebSocket client adapter for graph-layout sync.
//!
//! [`SyncClient`] is the counterpart of the hub for UI shells: it opens one
//! connection, keeps the most recent configuration snapshot in a watch cell,
//! and forwards local drags to the server while the connection is open.
//!
//! ## Lifecycle
//!
//! `Connecting -> Open -> Disconnected`. There is no automatic reconnect: a
//! dropped connection stays disconnected and the reason is exposed through
//! [`SyncStatus::Disconnected`] so the UI can tell the user that sync stopped.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{KirunaError, Result};
use crate::protocol::SyncMessage;
use crate::types::{ElementUpdate, GraphConfiguration};

/// Status of the sync connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    /// Handshake in progress
    Connecting,
    /// Receiving snapshots and accepting updates
    Open,
    /// Terminal state.
    Disconnected {
        /// Why sync stopped; `None` after a local disconnect
        reason: Option<String>,
    },
}

/// Client side of the sync channel.
///
/// Must be created inside a tokio runtime. Dropping the client closes the
/// connection.
pub struct SyncClient {
    status_rx: watch::Receiver<SyncStatus>,
    snapshot_rx: watch::Receiver<Option<GraphConfiguration>>,
    outgoing_tx: mpsc::UnboundedSender<SyncMessage>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Open a connection to the hub at `url` (e.g. `ws://localhost:3001/sync`).
    ///
    /// Returns immediately in the `Connecting` state; the handshake runs in
    /// a background task.
    pub fn connect(url: impl Into<String>) -> Self {
        let (status_tx, status_rx) = watch::channel(SyncStatus::Connecting);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        let task = tokio::spawn(connection_task(
            url.into(),
            status_tx,
            snapshot_tx,
            outgoing_rx,
            close_rx,
        ));

        Self {
            status_rx,
            snapshot_rx,
            outgoing_tx,
            close_tx: Some(close_tx),
            task: Some(task),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> SyncStatus {
        self.status_rx.borrow().clone()
    }

    /// Whether updates are currently forwarded.
    pub fn is_open(&self) -> bool {
        matches!(*self.status_rx.borrow(), SyncStatus::Open)
    }

    /// The most recent snapshot received, if any.
    ///
    /// Older snapshots are overwritten, not queued.
    pub fn latest_snapshot(&self) -> Option<GraphConfiguration> {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait for a snapshot newer than the last one observed through this
    /// method.
    ///
    /// Returns `None` once the connection task has ended.
    pub async fn changed(&mut self) -> Option<GraphConfiguration> {
        self.snapshot_rx.changed().await.ok()?;
        self.snapshot_rx.borrow_and_update().clone()
    }

    /// Wait until the handshake finishes.
    pub async fn wait_open(&mut self) -> Result<()> {
        let status = self
            .status_rx
            .wait_for(|status| !matches!(status, SyncStatus::Connecting))
            .await
            .map(|status| status.clone())
            .map_err(|_| KirunaError::Transport("connection task ended".to_string()))?;

        match status {
            SyncStatus::Open => Ok(()),
            SyncStatus::Disconnected { reason } => Err(KirunaError::Transport(
                reason.unwrap_or_else(|| "disconnected".to_string()),
            )),
            SyncStatus::Connecting => unreachable!("wait_for skips Connecting"),
        }
    }

    /// Wait until the connection has ended and return why.
    ///
    /// `None` means it was closed locally.
    pub async fn closed(&mut self) -> Option<String> {
        let status = self
            .status_rx
            .wait_for(|status| matches!(status, SyncStatus::Disconnected { .. }))
            .await
            .map(|status| status.clone());

        match status {
            Ok(SyncStatus::Disconnected { reason }) => reason,
            _ => Some("connection task ended".to_string()),
        }
    }

    /// Send a local drag to the hub.
    ///
    /// Silently dropped unless the connection is open; returns whether the
    /// update was queued. Delivery is never guaranteed.
    pub fn send(&self, update: ElementUpdate) -> bool {
        if !self.is_open() {
            log::debug!(
                "[SyncClient] Dropping update for {} {}: not connected",
                update.element_type,
                update.id
            );
            return false;
        }
        self.outgoing_tx.send(SyncMessage::from(update)).is_ok()
    }

    /// Close the connection and wait for the background task to finish.
    pub async fn disconnect(mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }
}

/// Background task owning the WebSocket.
async fn connection_task(
    url: String,
    status_tx: watch::Sender<SyncStatus>,
    snapshot_tx: watch::Sender<Option<GraphConfiguration>>,
    mut outgoing_rx: mpsc::UnboundedReceiver<SyncMessage>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let ws_stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("[SyncClient] Connection to {} failed: {}", url, e);
                status_tx.send_replace(SyncStatus::Disconnected {
                    reason: Some(format!("connection failed: {}", e)),
                });
                return;
            }
        },
        _ = &mut close_rx => {
            status_tx.send_replace(SyncStatus::Disconnected { reason: None });
            return;
        }
    };

    log::info!("[SyncClient] Connected to {}", url);
    status_tx.send_replace(SyncStatus::Open);

    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = write.send(Message::Close(None)).await;
                break None;
            }

            Some(message) = outgoing_rx.recv() => {
                let json = match message.encode() {
                    Ok(json) => json,
                    Err(e) => {
                        log::error!("[SyncClient] Failed to encode update: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::text(json)).await {
                    break Some(format!("send failed: {}", e));
                }
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match SyncMessage::decode(text.as_str()) {
                    Ok(SyncMessage::UpdateConfiguration(config)) => {
                        snapshot_tx.send_replace(Some(config));
                    }
                    Ok(_) => {
                        log::debug!("[SyncClient] Ignoring non-snapshot message");
                    }
                    Err(e) => {
                        log::warn!("[SyncClient] {}", e);
                    }
                },
                Some(Ok(Message::Close(_))) => break Some("closed by server".to_string()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(format!("read error: {}", e)),
                None => break Some("connection closed".to_string()),
            },
        }
    };

    match &reason {
        Some(reason) => log::warn!("[SyncClient] Disconnected: {}", reason),
        None => log::info!("[SyncClient] Disconnected"),
    }
    status_tx.send_replace(SyncStatus::Disconnected { reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_ends_disconnected() {
        // Port 1 is reserved and refuses connections on loopback.
        let mut client = SyncClient::connect("ws://127.0.0.1:1/sync");

        let result = client.wait_open().await;

        assert!(matches!(result, Err(KirunaError::Transport(_))));
        assert!(matches!(
            client.status(),
            SyncStatus::Disconnected { reason: Some(_) }
        ));
        assert!(!client.send(ElementUpdate::node("7", 0.1, 0.2)));
        assert!(client.latest_snapshot().is_none());
    }

    #[tokio::test]
    async fn test_send_is_dropped_while_connecting() {
        let client = SyncClient::connect("ws://127.0.0.1:1/sync");
        // Still connecting or already failed; either way nothing is queued.
        assert!(!client.send(ElementUpdate::node("7", 0.1, 0.2)));
        client.disconnect().await;
    }
}
