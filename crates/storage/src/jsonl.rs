use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::memory::select;
use crate::record::{OutboxRecord, OutboxStatus};
use crate::traits::OutboxStore;

/// Append-only outbox backed by a JSON-lines file.
///
/// Each record is serialized to a single line and synced to disk before
/// `append` returns. Writers are serialized through a mutex so concurrent
/// appends never interleave within a line.
pub struct JsonlOutbox {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlOutbox {
    /// Open (or create) the outbox file at `path` for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record currently in the file at `path`.
    ///
    /// Lines that fail to parse (e.g. a torn final line after a crash) are
    /// skipped with a warning rather than hiding the records around them.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<OutboxRecord>, StorageError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OutboxRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping unreadable outbox line"
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl OutboxStore for JsonlOutbox {
    async fn append(&self, record: OutboxRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn list(
        &self,
        status: Option<OutboxStatus>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, StorageError> {
        // Hold the writer lock so a concurrent append is never observed half-written.
        let _guard = self.file.lock().await;
        let records = Self::read_all(&self.path).await?;
        Ok(select(records.into_iter(), status, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SyncMethod;
    use serde_json::Map;

    fn record(collection: &str) -> OutboxRecord {
        OutboxRecord {
            method: SyncMethod::Post,
            route: format!("/api/{collection}"),
            collection: collection.to_string(),
            document: Map::new(),
            params: Map::new(),
            query: Map::new(),
            status: OutboxStatus::Pending,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");

        {
            let outbox = JsonlOutbox::open(&path).await.unwrap();
            outbox.append(record("vehiculos")).await.unwrap();
        }
        let outbox = JsonlOutbox::open(&path).await.unwrap();
        outbox.append(record("clientes")).await.unwrap();

        let all = outbox.list(None, 0).await.unwrap();
        let collections: Vec<_> = all.iter().map(|r| r.collection.as_str()).collect();
        assert_eq!(collections, vec!["vehiculos", "clientes"]);
    }

    #[tokio::test]
    async fn torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");

        let outbox = JsonlOutbox::open(&path).await.unwrap();
        outbox.append(record("abonos")).await.unwrap();
        drop(outbox);

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"method\":\"POST\",\"rou");
        std::fs::write(&path, content).unwrap();

        let records = JsonlOutbox::read_all(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].collection, "abonos");
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = JsonlOutbox::read_all(dir.path().join("nope.jsonl"))
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
