use roomcast_store::StoreError;

#[derive(Clone, Debug, thiserror::Error)]
pub enum RoomsError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
