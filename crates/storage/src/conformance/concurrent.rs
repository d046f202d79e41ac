use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use super::{make_record, TestResult};
use crate::{OutboxStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_appends_all_land",
        concurrent_appends_all_land(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_appends_are_not_torn",
        concurrent_appends_are_not_torn(factory).await,
    ));

    results
}

// ── Concurrent append: every record lands ────────────────────────────────────

/// N tasks append one record each. All N must be listed afterwards, each
/// exactly once.
async fn concurrent_appends_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("{:024x}", i + 1);
            s.append(make_record("movimientos", &id)).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    if listed.len() != N {
        return Err(format!("expected {N} records, got {}", listed.len()));
    }
    let ids: BTreeSet<_> = listed.iter().filter_map(|r| r.target_id()).collect();
    if ids.len() != N {
        return Err(format!("expected {N} distinct ids, got {}", ids.len()));
    }
    Ok(())
}

// ── Concurrent append: large documents stay whole ────────────────────────────

/// N tasks append records with large documents. Every listed record must
/// carry its full document; a torn write would fail to decode or lose keys.
async fn concurrent_appends_are_not_torn<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("{:024x}", i + 100);
            let mut record = make_record("tickets", &id);
            record.document.insert(
                "observaciones".to_string(),
                serde_json::Value::String("x".repeat(64 * 1024)),
            );
            s.append(record).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    if listed.len() != N {
        return Err(format!("expected {N} records, got {}", listed.len()));
    }
    for record in &listed {
        let len = record
            .document
            .get("observaciones")
            .and_then(|v| v.as_str())
            .map(str::len)
            .unwrap_or(0);
        if len != 64 * 1024 {
            return Err(format!("document truncated to {len} bytes"));
        }
    }
    Ok(())
}
