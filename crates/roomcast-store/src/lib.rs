pub mod batch;
pub mod error;
pub mod memory;

pub use batch::{Batch, Command};
pub use error::StoreError;
pub use memory::{MemoryHub, MemoryStore};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Inbound half of a channel subscription.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Next raw message, or `None` once the store side is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Boundary to the shared key-value store.
///
/// Only the operations this system needs are modeled; the store's own
/// semantics (persistence, reconnection, backoff) stay behind it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Members of the set at `key`; empty when the key is absent or expired.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// De-duplicated union of the sets at `keys`.
    async fn set_union(&self, keys: &[String]) -> Result<Vec<String>, StoreError>;

    /// Every live key starting with `prefix`. Cost scales with the keyspace;
    /// reserved for maintenance paths.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Apply a batch atomically.
    async fn apply(&self, batch: Batch) -> Result<(), StoreError>;

    /// Publish a payload to every subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), StoreError>;

    /// Subscribe to `channel`. The subscription stays live until this client
    /// closes.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;

    /// Release this client. Idempotent.
    async fn close(&self);
}

/// Creates the store clients a cluster node owns (publish, subscribe,
/// storage).
pub trait StoreFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Store>, StoreError>;
}
