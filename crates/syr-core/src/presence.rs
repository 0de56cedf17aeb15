use chrono::Utc;
use tokio::sync::Mutex;

use syr_types::models::{Audience, ConnectionId, Identity, OnlineUser, PresenceEntry};

/// Live connections and the identity bound to each.
///
/// All access goes through one mutex, so connects, disconnects and
/// snapshots never interleave. Entries keep insertion order.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: Mutex<Vec<PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to an identity. Rebinding replaces the entry in place.
    pub async fn bind(&self, connection_id: ConnectionId, identity: &Identity) -> PresenceEntry {
        let entry = PresenceEntry {
            connection_id,
            user_id: identity.id,
            username: identity.username.clone(),
            service_id: identity.service_id.clone(),
            connected_at: Utc::now(),
        };

        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|e| e.connection_id == connection_id) {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        entry
    }

    /// Remove a connection. Returns the removed entry; absent ids are a no-op.
    pub async fn unbind(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        let mut entries = self.entries.lock().await;
        let pos = entries.iter().position(|e| e.connection_id == connection_id)?;
        Some(entries.remove(pos))
    }

    /// Roster in insertion order.
    pub async fn snapshot(&self) -> Vec<OnlineUser> {
        self.entries.lock().await.iter().map(OnlineUser::from).collect()
    }

    pub async fn entries(&self) -> Vec<PresenceEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.connection_id == connection_id)
            .cloned()
    }

    /// Live connections belonging to an audience.
    pub async fn resolve(&self, audience: &Audience) -> Vec<ConnectionId> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| audience.includes(&e.service_id))
            .map(|e| e.connection_id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
