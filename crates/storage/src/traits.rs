use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{OutboxRecord, OutboxStatus};

/// The storage trait for outbox backends.
///
/// An `OutboxStore` is an append-only log of [`OutboxRecord`]s. The
/// interceptor only ever calls [`append`](OutboxStore::append); the
/// replication consumer owns every later state change.
///
/// ## Independence
///
/// Appends carry no ordering requirement relative to each other. Concurrent
/// appends must each land as one complete record; a backend never interleaves
/// or partially writes two records.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be held in axum
/// application state behind `Arc<dyn OutboxStore>` and used from spawned tasks.
#[async_trait]
pub trait OutboxStore: Send + Sync + 'static {
    /// Durably append one record.
    async fn append(&self, record: OutboxRecord) -> Result<(), StorageError>;

    /// List records in append order, optionally filtered by status.
    ///
    /// - `status`: only records with this status
    /// - `limit`: maximum number of results (0 = no limit)
    async fn list(
        &self,
        status: Option<OutboxStatus>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, StorageError>;
}
