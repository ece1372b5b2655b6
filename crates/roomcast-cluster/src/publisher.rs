use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::trace;

use roomcast_core::codec::Codec;
use roomcast_core::envelope::{BroadcastOptions, Envelope, MessageKind};
use roomcast_core::ids::NodeId;
use roomcast_rooms::BroadcastPublish;
use roomcast_store::{Store, StoreError};

use crate::error::ClusterError;

/// Outbound half of the relay.
///
/// Owns this node's identity and the silent-mode flag. Everything that can
/// publish holds the same `Arc<Publisher>`, so one flag governs every
/// publish path of the node while leaving other nodes in the process
/// untouched.
pub struct Publisher {
    node_id: NodeId,
    silent: AtomicBool,
    replay_lock: Mutex<()>,
    channel: String,
    codec: Arc<dyn Codec>,
    client: Arc<dyn Store>,
    faults: broadcast::Sender<ClusterError>,
}

impl Publisher {
    pub fn new(
        node_id: NodeId,
        channel: String,
        codec: Arc<dyn Codec>,
        client: Arc<dyn Store>,
        faults: broadcast::Sender<ClusterError>,
    ) -> Self {
        Self {
            node_id,
            silent: AtomicBool::new(false),
            replay_lock: Mutex::new(()),
            channel,
            codec,
            client,
            faults,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// True while an inbound replay is in progress.
    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }

    /// Enter silent mode for the duration of a replay.
    ///
    /// Replays are serialized: a second caller waits until the first guard
    /// drops. The flag resets when the guard drops, on every exit path.
    pub async fn enter_silent(&self) -> SilentGuard<'_> {
        let lock = self.replay_lock.lock().await;
        self.silent.store(true, Ordering::SeqCst);
        SilentGuard {
            publisher: self,
            _lock: lock,
        }
    }

    /// Surface a non-fatal fault to whoever is listening. Dropped when no
    /// listener is subscribed.
    pub fn report(&self, err: ClusterError) {
        if self.faults.receiver_count() > 0 {
            let _ = self.faults.send(err);
        } else {
            trace!(error = %err, "fault with no listener");
        }
    }
}

/// Keeps the node silent until dropped.
pub struct SilentGuard<'a> {
    publisher: &'a Publisher,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for SilentGuard<'_> {
    fn drop(&mut self) {
        self.publisher.silent.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BroadcastPublish for Publisher {
    /// Encode an envelope and publish it to every peer.
    ///
    /// A no-op in silent mode. Encode failures are reported and the message
    /// dropped; a failed channel publish surfaces to the caller.
    async fn publish(
        &self,
        data: &Value,
        kind: MessageKind,
        opts: &BroadcastOptions,
    ) -> Result<(), StoreError> {
        if self.is_silent() {
            return Ok(());
        }

        let envelope = Envelope {
            id: self.node_id,
            data: data.clone(),
            kind,
            opts: opts.clone(),
        };

        let payload = match self.codec.encode(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                self.report(ClusterError::Codec(err));
                return Ok(());
            }
        };

        self.client.publish(&self.channel, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_core::codec::JsonCodec;
    use roomcast_store::MemoryHub;
    use serde_json::json;

    fn publisher(hub: &MemoryHub) -> Publisher {
        let (faults, _) = broadcast::channel(16);
        Publisher::new(
            NodeId::random(),
            "pubsub".into(),
            Arc::new(JsonCodec),
            hub.client(),
            faults,
        )
    }

    #[tokio::test]
    async fn publish_reaches_the_channel() {
        let hub = MemoryHub::new();
        let p = publisher(&hub);
        let mut sub = hub.client().subscribe("pubsub").await.unwrap();

        p.publish(&json!("hi"), MessageKind::Server, &BroadcastOptions::default())
            .await
            .unwrap();

        let payload = sub.recv().await.unwrap();
        let envelope = JsonCodec.decode(&payload).unwrap();
        assert_eq!(envelope.id, p.node_id());
        assert_eq!(envelope.kind, MessageKind::Server);
    }

    #[tokio::test]
    async fn silent_mode_suppresses_publish() {
        let hub = MemoryHub::new();
        let p = publisher(&hub);
        let mut sub = hub.client().subscribe("pubsub").await.unwrap();

        {
            let _guard = p.enter_silent().await;
            assert!(p.is_silent());
            p.publish(&json!("hi"), MessageKind::Room, &BroadcastOptions::default())
                .await
                .unwrap();
        }
        assert!(!p.is_silent());

        // Nothing was published while silent; a publish after the guard
        // dropped goes through.
        p.publish(&json!("later"), MessageKind::Room, &BroadcastOptions::default())
            .await
            .unwrap();
        let payload = sub.recv().await.unwrap();
        let envelope = JsonCodec.decode(&payload).unwrap();
        assert_eq!(envelope.data, json!("later"));
    }

    #[tokio::test]
    async fn guard_resets_on_early_exit() {
        let hub = MemoryHub::new();
        let p = publisher(&hub);

        let result: Result<(), &str> = async {
            let _guard = p.enter_silent().await;
            Err("replay blew up")
        }
        .await;
        assert!(result.is_err());
        assert!(!p.is_silent());
    }
}
