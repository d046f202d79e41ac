//! Local store handlers: health plus generic document CRUD.
//!
//! These stand in for the parking backend's own route handlers so the
//! interceptor has real mutations to observe. Response shapes mirror the
//! backend's: created and replaced documents are returned whole, partial
//! updates are wrapped in an envelope, deletes return a status message.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use rand::RngCore;
use serde_json::{Map, Value};

use super::json_error;
use super::middleware::SkipOutbox;
use super::state::LocalStore;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /api/{collection}
pub(crate) async fn handle_list(
    State(store): State<Arc<LocalStore>>,
    Path(collection): Path<String>,
) -> impl IntoResponse {
    let collections = store.collections.read().await;
    let docs: Vec<Value> = collections
        .get(&collection)
        .map(|c| c.values().cloned().map(Value::Object).collect())
        .unwrap_or_default();
    (StatusCode::OK, Json(Value::Array(docs)))
}

/// GET /api/{collection}/{id}
pub(crate) async fn handle_get(
    State(store): State<Arc<LocalStore>>,
    Path((collection, id)): Path<(String, String)>,
) -> axum::response::Response {
    let collections = store.collections.read().await;
    match collections.get(&collection).and_then(|c| c.get(&id)) {
        Some(doc) => (StatusCode::OK, Json(Value::Object(doc.clone()))).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "document not found").into_response(),
    }
}

/// POST /api/{collection}
pub(crate) async fn handle_create(
    State(store): State<Arc<LocalStore>>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let Value::Object(mut doc) = body else {
        return json_error(StatusCode::BAD_REQUEST, "body must be a JSON object").into_response();
    };

    let id = new_id();
    let now = timestamp();
    doc.insert("_id".to_string(), Value::String(id.clone()));
    doc.insert("__v".to_string(), Value::from(0));
    doc.insert("createdAt".to_string(), Value::String(now.clone()));
    doc.insert("updatedAt".to_string(), Value::String(now));

    let mut collections = store.collections.write().await;
    collections
        .entry(collection)
        .or_default()
        .insert(id, doc.clone());

    (StatusCode::CREATED, Json(Value::Object(doc))).into_response()
}

/// PUT /api/{collection}/{id}
pub(crate) async fn handle_replace(
    State(store): State<Arc<LocalStore>>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let Value::Object(body) = body else {
        return json_error(StatusCode::BAD_REQUEST, "body must be a JSON object").into_response();
    };

    let mut collections = store.collections.write().await;
    let Some(existing) = collections.get_mut(&collection).and_then(|c| c.get_mut(&id)) else {
        return json_error(StatusCode::NOT_FOUND, "document not found").into_response();
    };

    let mut doc = body;
    for key in ["_id", "__v", "createdAt"] {
        if let Some(v) = existing.get(key) {
            doc.insert(key.to_string(), v.clone());
        }
    }
    doc.insert("updatedAt".to_string(), Value::String(timestamp()));
    *existing = doc.clone();

    (StatusCode::OK, Json(Value::Object(doc))).into_response()
}

/// PATCH /api/{collection}/{id}
///
/// An empty patch changes nothing and is not replicated.
pub(crate) async fn handle_update(
    State(store): State<Arc<LocalStore>>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let Value::Object(patch) = body else {
        return json_error(StatusCode::BAD_REQUEST, "body must be a JSON object").into_response();
    };

    let mut collections = store.collections.write().await;
    let Some(existing) = collections.get_mut(&collection).and_then(|c| c.get_mut(&id)) else {
        return json_error(StatusCode::NOT_FOUND, "document not found").into_response();
    };

    if patch.is_empty() {
        let response = serde_json::json!({"message": "sin cambios"});
        return (Extension(SkipOutbox), Json(response)).into_response();
    }

    existing.extend(patch);
    existing.insert("updatedAt".to_string(), Value::String(timestamp()));

    let response = serde_json::json!({
        "message": "actualizado",
        "document": Value::Object(existing.clone()),
    });
    (StatusCode::OK, Json(response)).into_response()
}

/// DELETE /api/{collection}/{id}
pub(crate) async fn handle_delete(
    State(store): State<Arc<LocalStore>>,
    Path((collection, id)): Path<(String, String)>,
) -> axum::response::Response {
    let mut collections = store.collections.write().await;
    match collections.get_mut(&collection).and_then(|c| c.remove(&id)) {
        Some(_) => {
            let response = serde_json::json!({"message": "eliminado"});
            (StatusCode::OK, Json(response)).into_response()
        }
        None => json_error(StatusCode::NOT_FOUND, "document not found").into_response(),
    }
}

/// DELETE /api/{collection}
///
/// With an object body, deletes the documents whose fields equal every
/// `filter` entry (or every body entry when there is no `filter`).
/// Without a body, clears the collection.
pub(crate) async fn handle_delete_all(
    State(store): State<Arc<LocalStore>>,
    Path(collection): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let filter = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(mut m)) => match m.remove("filter") {
            Some(Value::Object(f)) => Some(f),
            _ => Some(m),
        },
        _ => None,
    };

    let mut collections = store.collections.write().await;
    let docs = collections.entry(collection).or_default();
    let before = docs.len();
    match &filter {
        Some(f) if !f.is_empty() => docs.retain(|_, doc| !matches_filter(doc, f)),
        _ => docs.clear(),
    }
    let deleted = before - docs.len();

    let response = serde_json::json!({"message": "eliminados", "deletedCount": deleted});
    (StatusCode::OK, Json(response))
}

fn matches_filter(doc: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

/// 24-character hex identifier in the destination store's format.
fn new_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    parksync_core::ObjectId::from_bytes(bytes).to_hex()
}

fn timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
