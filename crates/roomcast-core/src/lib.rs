pub mod clock;
pub mod codec;
pub mod config;
pub mod connections;
pub mod envelope;
pub mod ids;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, CodecError, JsonCodec};
pub use config::ClusterConfig;
pub use connections::{ConnectionHandle, ConnectionRegistry, LocalConnections};
pub use envelope::{BroadcastOptions, DeliveryMethod, Envelope, MessageKind};
pub use ids::{NodeId, SocketId};
