use std::future::Future;

use super::{make_record, TestResult};
use crate::{OutboxStatus, OutboxStore};

pub(super) async fn run_list_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "list",
        "list_returns_append_order",
        list_returns_append_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "list",
        "list_respects_limit",
        list_respects_limit(factory).await,
    ));
    results.push(TestResult::from_result(
        "list",
        "list_filters_by_status",
        list_filters_by_status(factory).await,
    ));

    results
}

async fn list_returns_append_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for collection in ["vehiculos", "clientes", "abonos"] {
        store
            .append(make_record(collection, "507f1f77bcf86cd799439011"))
            .await
            .map_err(|e| format!("append {collection}: {e}"))?;
    }

    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    let order: Vec<&str> = listed.iter().map(|r| r.collection.as_str()).collect();
    if order != ["vehiculos", "clientes", "abonos"] {
        return Err(format!("unexpected order: {order:?}"));
    }
    Ok(())
}

async fn list_respects_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for i in 0..5 {
        store
            .append(make_record(&format!("c{i}"), "507f1f77bcf86cd799439011"))
            .await
            .map_err(|e| format!("append: {e}"))?;
    }

    let limited = store.list(None, 2).await.map_err(|e| format!("list: {e}"))?;
    if limited.len() != 2 {
        return Err(format!("expected 2 records, got {}", limited.len()));
    }
    if limited[0].collection != "c0" || limited[1].collection != "c1" {
        return Err("limit did not keep the oldest records".to_string());
    }
    Ok(())
}

async fn list_filters_by_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut synced = make_record("precios", "507f1f77bcf86cd799439011");
    synced.status = OutboxStatus::Synced;
    store
        .append(synced)
        .await
        .map_err(|e| format!("append synced: {e}"))?;
    store
        .append(make_record("precios", "507f1f77bcf86cd799439012"))
        .await
        .map_err(|e| format!("append pending: {e}"))?;

    let pending = store
        .list(Some(OutboxStatus::Pending), 0)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if pending.len() != 1 || pending[0].target_id() != Some("507f1f77bcf86cd799439012") {
        return Err(format!("status filter returned {pending:?}"));
    }

    let errors = store
        .list(Some(OutboxStatus::Error), 0)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !errors.is_empty() {
        return Err(format!("expected no error records, got {}", errors.len()));
    }
    Ok(())
}
