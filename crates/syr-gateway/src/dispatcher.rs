use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info};
use uuid::Uuid;

use syr_core::{PresenceRegistry, RouteError, Routed, RoutingEngine, StoreError};
use syr_types::events::GatewayEvent;
use syr_types::models::{Audience, ConnectionId, Identity, MessageDraft};

/// A serialized event, shared by every recipient of one fan-out.
pub type Outbound = Arc<str>;

/// Delivery gateway: owns the per-connection outbound queues and resolves
/// audiences against the presence registry at push time.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    presence: PresenceRegistry,

    /// Outbound queues: conn_id -> sender drained by that connection's send task
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                presence: PresenceRegistry::new(),
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.inner.presence
    }

    /// Register an authenticated connection and announce the new roster to
    /// everyone, including the newcomer. Returns (conn_id, receiver).
    pub async fn connect(&self, identity: &Identity) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        self.inner.presence.bind(conn_id, identity).await;

        info!("{} ({}) online as {}", identity.username, identity.service_id, conn_id);
        self.broadcast_presence().await;
        (conn_id, rx)
    }

    /// Drop a connection. Unknown ids are a no-op and emit nothing.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        self.inner.connections.write().await.remove(&conn_id);

        if let Some(entry) = self.inner.presence.unbind(conn_id).await {
            info!("{} ({}) offline", entry.username, entry.service_id);
            self.broadcast_presence().await;
        }
    }

    /// Push an event to every live connection in the audience.
    ///
    /// Fire-and-forget: a closed or vanished connection is skipped and the
    /// rest still receive the event. Returns the number of queued sends.
    pub async fn deliver(&self, audience: &Audience, event: &GatewayEvent) -> usize {
        let Some(payload) = encode(event) else {
            return 0;
        };

        let targets = self.inner.presence.resolve(audience).await;
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for conn_id in targets {
            match connections.get(&conn_id) {
                Some(tx) if tx.send(payload.clone()).is_ok() => delivered += 1,
                _ => debug!("Dropping delivery to departed connection {}", conn_id),
            }
        }
        delivered
    }

    /// Announce a persisted message to its audience.
    pub async fn publish(&self, routed: &Routed) -> usize {
        let event = GatewayEvent::for_message(routed.message.clone());
        self.deliver(&routed.audience, &event).await
    }

    /// Persist a draft and announce it.
    ///
    /// Runs on its own task: once the append has started, the publish
    /// happens even if the caller is cancelled (socket closed, HTTP client
    /// gone), so a durable message always reaches its live audience.
    pub async fn submit_and_publish(&self, router: &RoutingEngine, draft: MessageDraft) -> Result<Routed, RouteError> {
        let dispatcher = self.clone();
        let router = router.clone();
        let task = tokio::spawn(async move {
            let routed = router.submit(draft).await?;
            dispatcher.publish(&routed).await;
            Ok(routed)
        });

        task.await.unwrap_or_else(|e| {
            error!("submit task failed: {}", e);
            Err(RouteError::PersistenceFailed(StoreError::Unavailable("submit task failed".into())))
        })
    }

    pub async fn broadcast(&self, event: &GatewayEvent) -> usize {
        self.deliver(&Audience::All, event).await
    }

    /// Send a targeted event to one connection.
    pub async fn send_to(&self, conn_id: ConnectionId, event: &GatewayEvent) -> bool {
        let Some(payload) = encode(event) else {
            return false;
        };
        let connections = self.inner.connections.read().await;
        connections.get(&conn_id).is_some_and(|tx| tx.send(payload).is_ok())
    }

    async fn broadcast_presence(&self) {
        let roster = self.inner.presence.snapshot().await;
        self.broadcast(&GatewayEvent::UsersOnline(roster)).await;
    }
}

fn encode(event: &GatewayEvent) -> Option<Outbound> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            None
        }
    }
}
