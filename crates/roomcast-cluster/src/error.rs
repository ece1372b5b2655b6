use roomcast_core::codec::CodecError;
use roomcast_rooms::RoomsError;
use roomcast_store::StoreError;

#[derive(Clone, Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("rooms error: {0}")]
    Rooms(#[from] RoomsError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("cluster closed")]
    Closed,
}
