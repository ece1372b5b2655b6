use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use roomcast_core::clock::{Clock, SystemClock};
use roomcast_core::codec::{Codec, JsonCodec};
use roomcast_core::config::ClusterConfig;
use roomcast_core::connections::{deliver_all, ConnectionRegistry, LocalConnections};
use roomcast_core::envelope::{BroadcastOptions, DeliveryMethod, MessageKind};
use roomcast_core::ids::NodeId;
use roomcast_rooms::{BroadcastPublish, Directory, KeyScheme};
use roomcast_store::{Store, StoreFactory};

use crate::dispatcher::Dispatcher;
use crate::error::ClusterError;
use crate::publisher::Publisher;

/// One node's handle on the cluster: the membership directory, the local
/// connection table, and the relay over the shared channel.
pub struct Cluster {
    publisher: Arc<Publisher>,
    directory: Arc<Directory>,
    connections: Arc<LocalConnections>,
    pub_client: Arc<dyn Store>,
    sub_client: Arc<dyn Store>,
    storage: Arc<dyn Store>,
    faults: broadcast::Sender<ClusterError>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Cluster {
    /// Connect a node with the default JSON framing and system clock.
    pub async fn connect(
        factory: &dyn StoreFactory,
        config: ClusterConfig,
    ) -> Result<Self, ClusterError> {
        Self::connect_with(factory, config, Arc::new(JsonCodec), Arc::new(SystemClock)).await
    }

    /// Connect with an explicit codec and clock, for frameworks that carry
    /// their own framing and for tests that drive time by hand.
    pub async fn connect_with(
        factory: &dyn StoreFactory,
        config: ClusterConfig,
        codec: Arc<dyn Codec>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClusterError> {
        // The three store roles this node owns: publish, subscribe, storage.
        let pub_client = factory.create()?;
        let sub_client = factory.create()?;
        let storage = factory.create()?;

        let channel = config.channel_name();
        let (faults, _) = broadcast::channel(64);

        let publisher = Arc::new(Publisher::new(
            NodeId::random(),
            channel.clone(),
            Arc::clone(&codec),
            Arc::clone(&pub_client),
            faults.clone(),
        ));

        let directory = Arc::new(Directory::new(
            Arc::clone(&storage),
            KeyScheme::new(config.prefix.as_str(), config.bucket_ttl(), config.number_of_sets),
            clock,
            Arc::clone(&publisher) as Arc<dyn BroadcastPublish>,
            config.ttl(),
        ));

        let connections = Arc::new(LocalConnections::new());

        let subscription = sub_client.subscribe(&channel).await?;
        info!(node = %publisher.node_id(), channel = %channel, "joined cluster channel");

        let dispatcher = Dispatcher::new(
            Arc::clone(&publisher),
            Arc::clone(&directory),
            Arc::clone(&connections) as Arc<dyn ConnectionRegistry>,
            codec,
        )
        .spawn(subscription);

        Ok(Self {
            publisher,
            directory,
            connections,
            pub_client,
            sub_client,
            storage,
            faults,
            dispatcher: Mutex::new(Some(dispatcher)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.publisher.node_id()
    }

    /// The membership directory backing this node.
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// This node's connection table; the owning framework registers and
    /// removes handles as clients come and go.
    pub fn connections(&self) -> &Arc<LocalConnections> {
        &self.connections
    }

    /// Write `data` to every client in the fleet.
    pub async fn write(&self, data: Value) -> Result<(), ClusterError> {
        self.fan_out(DeliveryMethod::Write, data).await
    }

    /// Send `data` as a structured event to every fleet client whose
    /// connection supports it.
    pub async fn send(&self, data: Value) -> Result<(), ClusterError> {
        self.fan_out(DeliveryMethod::Send, data).await
    }

    async fn fan_out(&self, method: DeliveryMethod, data: Value) -> Result<(), ClusterError> {
        self.ensure_open()?;
        let opts = BroadcastOptions {
            method,
            ..Default::default()
        };
        self.publisher
            .publish(&data, MessageKind::Server, &opts)
            .await?;
        deliver_all(self.connections.as_ref(), method, &data);
        Ok(())
    }

    /// Broadcast into rooms; see [`Directory::broadcast`].
    pub async fn broadcast(
        &self,
        data: &Value,
        opts: BroadcastOptions,
    ) -> Result<(), ClusterError> {
        self.ensure_open()?;
        self.directory
            .broadcast(data, opts, self.connections.as_ref())
            .await?;
        Ok(())
    }

    /// Subscribe to non-fatal relay faults: malformed peer messages and
    /// encode failures. Faults arriving while nobody listens are dropped.
    pub fn faults(&self) -> broadcast::Receiver<ClusterError> {
        self.faults.subscribe()
    }

    /// Tear down this node's store connections. The first call wins; later
    /// calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.dispatcher.lock().take() {
            task.abort();
        }
        self.sub_client.close().await;
        self.pub_client.close().await;
        self.storage.close().await;
        info!(node = %self.node_id(), "cluster node closed");
    }

    fn ensure_open(&self) -> Result<(), ClusterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClusterError::Closed);
        }
        Ok(())
    }
}
