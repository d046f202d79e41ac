use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{OutboxRecord, OutboxStatus};
use crate::traits::OutboxStore;

/// Process-local outbox. Records are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    records: RwLock<Vec<OutboxRecord>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn append(&self, record: OutboxRecord) -> Result<(), StorageError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list(
        &self,
        status: Option<OutboxStatus>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(select(records.iter().cloned(), status, limit))
    }
}

/// Apply the status filter and limit shared by every backend.
pub(crate) fn select(
    records: impl Iterator<Item = OutboxRecord>,
    status: Option<OutboxStatus>,
    limit: usize,
) -> Vec<OutboxRecord> {
    let filtered = records.filter(|r| status.map_or(true, |s| r.status == s));
    if limit == 0 {
        filtered.collect()
    } else {
        filtered.take(limit).collect()
    }
}
