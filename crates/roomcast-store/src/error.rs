#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Command(String),

    #[error("connection lost: {0}")]
    Connection(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("store client closed")]
    Closed,
}
