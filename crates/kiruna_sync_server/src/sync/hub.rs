use super::registry::{ConnectionId, ConnectionRegistry, Frame, FrameSender};
use kiruna_core::{
    Classified, ConfigStore, ElementId, ElementType, GraphConfiguration, KirunaError,
    KnownElements, StoreResult, build_snapshot, classify,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Statistics about the hub
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub active_connections: usize,
    pub updates_applied: u64,
    pub broadcasts_sent: u64,
}

/// Commands processed by the hub task, one at a time
pub enum HubCommand {
    Connect {
        id: ConnectionId,
        sender: FrameSender,
    },
    Message {
        id: ConnectionId,
        raw: String,
    },
    Disconnect {
        id: ConnectionId,
    },
    RemoveElement {
        element_type: ElementType,
        id: ElementId,
        reply: oneshot::Sender<Result<bool, KirunaError>>,
    },
    Reset {
        reply: oneshot::Sender<Result<(), KirunaError>>,
    },
    Prune {
        catalog: KnownElements,
        reply: oneshot::Sender<Result<usize, KirunaError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<GraphConfiguration, KirunaError>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Shutdown,
}

/// Errors returned through a [`HubHandle`]
#[derive(Debug)]
pub enum HubError {
    /// The hub task has stopped
    Closed,
    /// The configuration store failed
    Store(KirunaError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Closed => write!(f, "Sync hub is not running"),
            HubError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HubError {}

impl From<KirunaError> for HubError {
    fn from(e: KirunaError) -> Self {
        HubError::Store(e)
    }
}

/// The process-wide coordinator of live connections and the shared
/// configuration.
///
/// All store mutations and broadcasts are driven by the single task that
/// owns the hub, so each message runs `classify -> edit -> load -> broadcast`
/// without interleaving with any other. Store calls themselves run on the
/// blocking pool while the hub task waits for them. Messages from different connections
/// are applied in the order they reach the hub; edits to the same element
/// are last-write-wins.
pub struct SyncHub {
    registry: ConnectionRegistry,
    store: Arc<dyn ConfigStore>,
    updates_applied: u64,
    broadcasts_sent: u64,
}

impl SyncHub {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store,
            updates_applied: 0,
            broadcasts_sent: 0,
        }
    }

    /// Move the hub onto its own task and return a handle to it.
    ///
    /// The task ends on [`HubHandle::shutdown`] or when every handle has been
    /// dropped.
    pub fn spawn(self) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (HubHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        info!("Sync hub started");
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Connect { id, sender } => self.on_connect(id, sender).await,
                HubCommand::Message { id, raw } => {
                    self.on_message(id, &raw).await;
                }
                HubCommand::Disconnect { id } => self.on_close(&id),
                HubCommand::RemoveElement {
                    element_type,
                    id,
                    reply,
                } => {
                    let _ = reply.send(self.remove_element(element_type, id).await);
                }
                HubCommand::Reset { reply } => {
                    let _ = reply.send(self.reset().await);
                }
                HubCommand::Prune { catalog, reply } => {
                    let _ = reply.send(self.prune(catalog).await);
                }
                HubCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot().await);
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                HubCommand::Shutdown => break,
            }
        }
        info!(
            "Sync hub stopped ({} connections dropped)",
            self.registry.len()
        );
    }

    /// Register a new connection and replay the current configuration to it.
    pub async fn on_connect(&mut self, id: ConnectionId, sender: FrameSender) {
        if !self.registry.register(id, sender) {
            debug!("Connection {} already registered", id);
            return;
        }
        info!(
            "Connection {} opened ({} active)",
            id,
            self.registry.len()
        );

        match self.encoded_snapshot().await {
            Ok(frame) => {
                self.registry.send_to(&id, frame);
            }
            Err(e) => error!("Failed to load configuration for {}: {}", id, e),
        }
    }

    /// Apply one client frame and broadcast the result.
    ///
    /// Returns the number of connections the new snapshot was queued for, or
    /// `None` if the frame was dropped or could not be persisted.
    pub async fn on_message(&mut self, id: ConnectionId, raw: &str) -> Option<usize> {
        let update = match classify(raw) {
            Ok(Classified::Update(update)) => update,
            Ok(Classified::Ignored) => {
                debug!("Ignoring unrecognized message from {}", id);
                return None;
            }
            Err(e) => {
                warn!("Dropping message from {}: {}", id, e);
                return None;
            }
        };

        let edit = update.clone();
        if let Err(e) = self
            .with_store(move |store| store.edit(edit.element_type, &edit.id, edit.position))
            .await
        {
            error!(
                "Failed to persist {} {} from {}: {}",
                update.element_type, update.id, id, e
            );
            return None;
        }
        self.updates_applied += 1;
        debug!(
            "Applied {} {} -> ({}, {}) from {}",
            update.element_type, update.id, update.position.x, update.position.y, id
        );

        match self.broadcast_current().await {
            Ok(delivered) => Some(delivered),
            Err(e) => {
                error!("Failed to reload configuration after update: {}", e);
                None
            }
        }
    }

    /// Forget a closed connection. Updates it already sent stay applied.
    pub fn on_close(&mut self, id: &ConnectionId) {
        if self.registry.unregister(id) {
            info!(
                "Connection {} closed ({} active)",
                id,
                self.registry.len()
            );
        }
    }

    /// Remove one element's position and broadcast if anything changed.
    pub async fn remove_element(
        &mut self,
        element_type: ElementType,
        id: ElementId,
    ) -> Result<bool, KirunaError> {
        let target = id.clone();
        let removed = self
            .with_store(move |store| store.remove(element_type, &target))
            .await?;
        if removed {
            info!("Removed position of {} {}", element_type, id);
            self.broadcast_current().await?;
        }
        Ok(removed)
    }

    /// Clear every position and broadcast the empty configuration.
    pub async fn reset(&mut self) -> Result<(), KirunaError> {
        self.with_store(|store| store.reset()).await?;
        info!("Graph configuration reset");
        self.broadcast_current().await?;
        Ok(())
    }

    /// Drop positions of elements the catalog no longer knows.
    pub async fn prune(&mut self, catalog: KnownElements) -> Result<usize, KirunaError> {
        let removed = self
            .with_store(move |store| store.prune(&catalog))
            .await?;
        if removed > 0 {
            info!("Pruned {} orphaned positions", removed);
            self.broadcast_current().await?;
        }
        Ok(removed)
    }

    pub async fn snapshot(&self) -> Result<GraphConfiguration, KirunaError> {
        self.with_store(|store| store.load()).await
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            active_connections: self.registry.len(),
            updates_applied: self.updates_applied,
            broadcasts_sent: self.broadcasts_sent,
        }
    }

    /// Run a store call on the blocking pool so disk I/O does not stall a
    /// runtime worker.
    async fn with_store<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ConfigStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| KirunaError::Io(std::io::Error::other(e.to_string())))?
    }

    async fn encoded_snapshot(&self) -> Result<Frame, KirunaError> {
        let config = self.with_store(|store| store.load()).await?;
        Ok(Frame::from(build_snapshot(config).encode()?))
    }

    /// Reload the full configuration and queue it for every connection.
    async fn broadcast_current(&mut self) -> Result<usize, KirunaError> {
        let frame = self.encoded_snapshot().await?;
        let delivered = self.registry.broadcast(&frame);
        self.broadcasts_sent += 1;
        debug!("Broadcast snapshot to {} connections", delivered);
        Ok(delivered)
    }
}

/// Cloneable handle for talking to the hub task
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Register a connection. Returns false if the hub has stopped.
    pub fn connect(&self, id: ConnectionId, sender: FrameSender) -> bool {
        self.tx.send(HubCommand::Connect { id, sender }).is_ok()
    }

    /// Forward a raw client frame.
    pub fn message(&self, id: ConnectionId, raw: String) -> bool {
        self.tx.send(HubCommand::Message { id, raw }).is_ok()
    }

    pub fn disconnect(&self, id: ConnectionId) {
        let _ = self.tx.send(HubCommand::Disconnect { id });
    }

    pub async fn remove_element(
        &self,
        element_type: ElementType,
        id: ElementId,
    ) -> Result<bool, HubError> {
        self.request(|reply| HubCommand::RemoveElement {
            element_type,
            id,
            reply,
        })
        .await?
        .map_err(HubError::from)
    }

    pub async fn reset(&self) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Reset { reply })
            .await?
            .map_err(HubError::from)
    }

    pub async fn prune(&self, catalog: KnownElements) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::Prune { catalog, reply })
            .await?
            .map_err(HubError::from)
    }

    pub async fn snapshot(&self) -> Result<GraphConfiguration, HubError> {
        self.request(|reply| HubCommand::Snapshot { reply })
            .await?
            .map_err(HubError::from)
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|reply| HubCommand::Stats { reply }).await
    }

    /// Stop the hub task. Pending commands queued before this one still run.
    pub fn shutdown(&self) {
        let _ = self.tx.send(HubCommand::Shutdown);
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }
}
