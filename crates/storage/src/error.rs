/// All errors that can be returned by an OutboxStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing file or device could not be written or read.
    #[error("outbox i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded to, or decoded from, its stored form.
    #[error("outbox serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backend-specific storage error (DB connection, closed handle, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
