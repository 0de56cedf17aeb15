use std::sync::Arc;
use std::time::{Duration, Instant};

use syr_db::{Database, StoreError, StoreResult};
use syr_types::models::{Message, NewMessage};
use tracing::error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Async facade over the message tables.
///
/// Every call runs on the blocking pool and is bounded by `timeout`;
/// expiry surfaces as `StoreError::Unavailable`. Writes carry the same
/// deadline into their transaction, so an abandoned write rolls back
/// instead of committing after the caller was told it failed.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    timeout: Duration,
}

impl MessageStore {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    pub async fn append(&self, new: NewMessage) -> StoreResult<Message> {
        let deadline = Instant::now() + self.timeout;
        self.run(move |db| db.insert_message(&new, deadline)).await
    }

    pub async fn get(&self, id: i64) -> StoreResult<Message> {
        self.run(move |db| db.get_message(id)).await
    }

    pub async fn list_all(&self, limit: Option<u32>) -> StoreResult<Vec<Message>> {
        self.run(move |db| db.list_messages(limit)).await
    }

    pub async fn list_public(&self) -> StoreResult<Vec<Message>> {
        self.run(|db| db.list_public_messages()).await
    }

    pub async fn list_private(&self, service_a: &str, service_b: &str) -> StoreResult<Vec<Message>> {
        let (a, b) = (service_a.to_string(), service_b.to_string());
        self.run(move |db| db.list_private_messages(&a, &b)).await
    }

    pub async fn mark_read(&self, message_id: i64, user_id: i64) -> StoreResult<Message> {
        let deadline = Instant::now() + self.timeout;
        self.run(move |db| db.mark_read(message_id, user_id, deadline)).await
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.run(|db| db.count_messages()).await
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("spawn_blocking join error: {}", e);
                Err(StoreError::Unavailable("store task failed".into()))
            }
            Err(_) => {
                error!("Store operation exceeded {:?}", self.timeout);
                Err(StoreError::Unavailable("store operation timed out".into()))
            }
        }
    }
}
