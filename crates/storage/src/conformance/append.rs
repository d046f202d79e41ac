use std::future::Future;

use serde_json::json;

use super::{make_bulk_delete, make_record, object, TestResult};
use crate::{OutboxStatus, OutboxStore};

pub(super) async fn run_append_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "append",
        "append_then_list_returns_record",
        append_then_list_returns_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "append_preserves_nested_document",
        append_preserves_nested_document(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "append_preserves_bulk_marker",
        append_preserves_bulk_marker(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "fresh_store_is_empty",
        fresh_store_is_empty(factory).await,
    ));

    results
}

async fn append_then_list_returns_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let record = make_record("vehiculos", "507f1f77bcf86cd799439011");
    store
        .append(record.clone())
        .await
        .map_err(|e| format!("append: {e}"))?;

    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    if listed.len() != 1 {
        return Err(format!("expected 1 record, got {}", listed.len()));
    }
    if listed[0] != record {
        return Err(format!("record changed in storage: {:?}", listed[0]));
    }
    if listed[0].status != OutboxStatus::Pending {
        return Err(format!("expected pending, got {:?}", listed[0].status));
    }
    Ok(())
}

async fn append_preserves_nested_document<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut record = make_record("cierresdecajas", "65a1b2c3d4e5f60718293a4b");
    record.document = object(json!({
        "_id": "65a1b2c3d4e5f60718293a4b",
        "operador": "507f1f77bcf86cd799439011",
        "totales": {"efectivo": 1500, "tarjeta": [100, 200]},
        "fecha": "2025-01-01",
    }));
    store
        .append(record.clone())
        .await
        .map_err(|e| format!("append: {e}"))?;

    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    let got = listed.first().ok_or("no record listed")?;
    if got.document != record.document {
        return Err(format!("document mismatch: {:?}", got.document));
    }
    Ok(())
}

async fn append_preserves_bulk_marker<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .append(make_bulk_delete("tarifas"))
        .await
        .map_err(|e| format!("append: {e}"))?;

    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    let got = listed.first().ok_or("no record listed")?;
    if !got.is_bulk() {
        return Err(format!("bulk marker lost: {:?}", got.query));
    }
    if got.target_id().is_some() {
        return Err("bulk delete gained a target id".to_string());
    }
    Ok(())
}

async fn fresh_store_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OutboxStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let listed = store.list(None, 0).await.map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!("expected empty store, got {} records", listed.len()));
    }
    Ok(())
}
