//! Runs the backend conformance suite against every bundled outbox backend.

use parksync_storage::conformance::run_conformance_suite;
use parksync_storage::{JsonlOutbox, MemoryOutbox};

#[tokio::test]
async fn memory_outbox_conformance() {
    let report = run_conformance_suite(|| async { MemoryOutbox::new() }).await;
    assert!(report.total > 0);
    assert!(report.failed == 0, "{report}");
}

#[tokio::test]
async fn jsonl_outbox_conformance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let counter = std::sync::atomic::AtomicUsize::new(0);

    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let path = dir.path().join(format!("outbox-{n}.jsonl"));
        async move { JsonlOutbox::open(path).await.expect("open outbox") }
    })
    .await;
    assert!(report.total > 0);
    assert!(report.failed == 0, "{report}");
}
