//! Conformance test suite for `OutboxStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `OutboxStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Append**: records are stored verbatim, including nested documents
//! - **Listing**: append order, status filtering, limits
//! - **Concurrency**: independent concurrent appends all land intact
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty outbox for each test:
//!
//! ```ignore
//! use parksync_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryOutbox::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod append;
mod concurrent;
mod list;

use std::fmt;
use std::future::Future;

use serde_json::{json, Map, Value};

use crate::record::{OutboxRecord, OutboxStatus, SyncMethod};
use crate::OutboxStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "append", "list", "concurrent").
    pub category: String,
    /// Test name (e.g. "append_then_list_returns_record").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against an outbox backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// outbox, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(append::run_append_tests(&factory).await);
    results.extend(list::run_list_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn make_record(collection: &str, id: &str) -> OutboxRecord {
    OutboxRecord {
        method: SyncMethod::Post,
        route: format!("/api/{collection}"),
        collection: collection.to_string(),
        document: object(json!({"_id": id, "patente": "AB123CD"})),
        params: object(json!({"_id": id, "id": id})),
        query: Map::new(),
        status: OutboxStatus::Pending,
        created_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_bulk_delete(collection: &str) -> OutboxRecord {
    OutboxRecord {
        method: SyncMethod::Delete,
        route: format!("/api/{collection}"),
        collection: collection.to_string(),
        document: Map::new(),
        params: Map::new(),
        query: object(json!({"bulk": true})),
        status: OutboxStatus::Pending,
        created_at: "2025-01-01T00:00:01Z".to_string(),
    }
}
