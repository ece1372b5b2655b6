use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use roomcast_core::codec::Codec;
use roomcast_core::connections::{deliver_all, ConnectionRegistry};
use roomcast_core::envelope::{Envelope, MessageKind};
use roomcast_rooms::Directory;
use roomcast_store::Subscription;

use crate::error::ClusterError;
use crate::publisher::Publisher;

/// Inbound half of the relay: replays peers' published intents against this
/// node's own connection table.
pub(crate) struct Dispatcher {
    publisher: Arc<Publisher>,
    directory: Arc<Directory>,
    connections: Arc<dyn ConnectionRegistry>,
    codec: Arc<dyn Codec>,
}

impl Dispatcher {
    pub fn new(
        publisher: Arc<Publisher>,
        directory: Arc<Directory>,
        connections: Arc<dyn ConnectionRegistry>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            publisher,
            directory,
            connections,
            codec,
        }
    }

    /// Consume the subscription until the channel goes away.
    pub fn spawn(self, mut subscription: Subscription) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(payload) = subscription.recv().await {
                self.handle(&payload).await;
            }
            info!(node = %self.publisher.node_id(), "cluster channel closed");
        })
    }

    async fn handle(&self, payload: &[u8]) {
        let envelope = match self.codec.decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                // A malformed peer message must never take the node down.
                warn!(error = %err, "dropping undecodable cluster message");
                self.publisher.report(ClusterError::Codec(err));
                return;
            }
        };

        if envelope.kind == MessageKind::Unknown {
            debug!("dropping cluster message of unknown kind");
            return;
        }

        if envelope.id == self.publisher.node_id() {
            debug!(node = %envelope.id, "dropping own message");
            return;
        }

        self.replay(envelope).await;
    }

    /// Replay a peer's intent locally.
    ///
    /// Runs inside the silent guard: the delivery paths below publish on
    /// their normal code path, and the guard turns those publishes into
    /// no-ops so a replayed message is never re-broadcast.
    async fn replay(&self, envelope: Envelope) {
        let _guard = self.publisher.enter_silent().await;

        match envelope.kind {
            MessageKind::Room => {
                if let Err(err) = self
                    .directory
                    .broadcast(&envelope.data, envelope.opts, self.connections.as_ref())
                    .await
                {
                    warn!(error = %err, "room replay failed");
                }
            }
            MessageKind::Server => {
                let delivered = deliver_all(
                    self.connections.as_ref(),
                    envelope.opts.method,
                    &envelope.data,
                );
                debug!(delivered, "server replay");
            }
            MessageKind::Unknown => {}
        }
    }
}
