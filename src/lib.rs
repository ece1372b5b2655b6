//! Room-scoped broadcast messaging across independent server processes,
//! coordinated through a shared external key-value store.
//!
//! Each server process runs one [`Cluster`] node. Nodes record which local
//! connections joined which rooms in a shared membership directory with
//! sliding expiry, and relay every broadcast over one shared channel so
//! every peer can replay it against its own connections, without
//! duplication and without re-broadcast loops.
//!
//! ```no_run
//! use roomcast::{BroadcastOptions, Cluster, ClusterConfig, MemoryHub, SocketId};
//!
//! # async fn demo() -> Result<(), roomcast::ClusterError> {
//! let hub = MemoryHub::new();
//! let node = Cluster::connect(&hub, ClusterConfig::default()).await?;
//!
//! node.directory().add(&SocketId::from_raw("12"), "news").await?;
//! node.broadcast(&serde_json::json!("hello"), BroadcastOptions::rooms(["news"]))
//!     .await?;
//!
//! node.close().await;
//! # Ok(())
//! # }
//! ```

pub use roomcast_cluster::{Cluster, ClusterError, Publisher, SilentGuard};
pub use roomcast_core::{
    BroadcastOptions, Clock, ClusterConfig, Codec, CodecError, ConnectionHandle,
    ConnectionRegistry, DeliveryMethod, Envelope, JsonCodec, LocalConnections, ManualClock,
    MessageKind, NodeId, SocketId, SystemClock,
};
pub use roomcast_rooms::{BroadcastPublish, Directory, KeyScheme, RoomsError};
pub use roomcast_store::{
    Batch, Command, MemoryHub, MemoryStore, Store, StoreError, StoreFactory, Subscription,
};
