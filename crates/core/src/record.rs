//! Outbox record assembly.

use parksync_storage::{OutboxRecord, OutboxStatus, SyncMethod};
use serde_json::{Map, Value};

use crate::ident::{normalize, ObjectId};
use crate::reconstruct::{
    reconstruct_document, AuthenticatedActor, ReconstructPolicy, RequestContext,
};
use crate::routes::RouteMatch;

/// Everything the interceptor captured about the request side of a mutation.
#[derive(Debug, Clone, Copy)]
pub struct Mutation<'a> {
    pub method: SyncMethod,
    /// Request path without the query string.
    pub path: &'a str,
    /// Raw query string, without the leading `?`.
    pub raw_query: Option<&'a str>,
    /// Decoded query pairs.
    pub query: &'a Map<String, Value>,
    /// Parsed request body (`Value::Null` when absent or not JSON).
    pub body: &'a Value,
    pub actor: Option<&'a AuthenticatedActor>,
}

impl Mutation<'_> {
    /// Path plus query string, as the caller sent it.
    pub fn route(&self) -> String {
        match self.raw_query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.to_string(),
        }
    }
}

/// Build the pending outbox record for a successful mutation.
pub fn build_record(
    mutation: &Mutation<'_>,
    route: &RouteMatch,
    response: &Value,
    policy: &ReconstructPolicy,
) -> OutboxRecord {
    let now = time::OffsetDateTime::now_utc();
    let created_at = now
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    build_record_at(mutation, route, response, policy, created_at)
}

/// [`build_record`] with an explicit creation timestamp.
pub fn build_record_at(
    mutation: &Mutation<'_>,
    route: &RouteMatch,
    response: &Value,
    policy: &ReconstructPolicy,
    created_at: String,
) -> OutboxRecord {
    let ctx = RequestContext {
        collection: &route.collection,
        body: mutation.body,
        actor: mutation.actor,
    };
    let mut document = reconstruct_document(&ctx, response, policy);

    let segments = route.segments(mutation.path);
    let target = resolve_target(&segments, &document, mutation.body, response);

    let mut params = Map::new();
    if !segments.is_empty() {
        params.insert(
            "segments".to_string(),
            Value::Array(segments.iter().map(|s| Value::from(*s)).collect()),
        );
    }

    let mut query = mutation.query.clone();
    query.remove("bulk");

    match target {
        Some(id) => {
            params.insert("_id".to_string(), id.into());
            params.insert("id".to_string(), id.into());
            // The canonical identifier is the only one carried downstream.
            if document.get("id").and_then(normalize).is_some() {
                document.remove("id");
            }
            document.insert("_id".to_string(), id.into());
        }
        None if mutation.method == SyncMethod::Delete => {
            query.insert("bulk".to_string(), Value::Bool(true));
            if let Some(filter) = bulk_filter(mutation.body) {
                query.insert("filter".to_string(), filter);
            }
            document.clear();
            tracing::debug!(
                collection = %route.collection,
                route = %mutation.route(),
                "delete without identifier recorded as bulk"
            );
        }
        None => {}
    }

    OutboxRecord {
        method: mutation.method,
        route: mutation.route(),
        collection: route.collection.clone(),
        document,
        params,
        query,
        status: OutboxStatus::Pending,
        created_at,
    }
}

/// Identifier of the affected entity, by source priority: reconstructed
/// document, path segment, request body, raw response.
///
/// A nested action route can carry a parent id in its path while the
/// document it returns has its own, so the document comes first.
fn resolve_target(
    segments: &[&str],
    document: &Map<String, Value>,
    request: &Value,
    response: &Value,
) -> Option<ObjectId> {
    id_field(document)
        .or_else(|| segments.iter().find_map(|s| normalize(&Value::from(*s))))
        .or_else(|| request.as_object().and_then(id_field))
        .or_else(|| normalize(response))
}

fn id_field(map: &Map<String, Value>) -> Option<ObjectId> {
    ["_id", "id"]
        .iter()
        .find_map(|k| map.get(*k).and_then(normalize))
}

fn bulk_filter(request: &Value) -> Option<Value> {
    let body = request.as_object()?;
    match body.get("filter") {
        Some(filter @ Value::Object(_)) => Some(filter.clone()),
        _ if !body.is_empty() => Some(request.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "507f1f77bcf86cd799439011";
    const OTHER: &str = "65a1b2c3d4e5f60718293a4b";

    fn route(prefix: &str, collection: &str) -> RouteMatch {
        RouteMatch {
            prefix: prefix.to_string(),
            collection: collection.to_string(),
        }
    }

    fn build(
        method: SyncMethod,
        path: &str,
        query: Value,
        body: Value,
        response: Value,
    ) -> OutboxRecord {
        let query = query.as_object().cloned().unwrap_or_default();
        let mutation = Mutation {
            method,
            path,
            raw_query: None,
            query: &query,
            body: &body,
            actor: None,
        };
        build_record_at(
            &mutation,
            &route("/api/vehiculos", "vehiculos"),
            &response,
            &ReconstructPolicy::default(),
            "2025-01-01T00:00:00Z".to_string(),
        )
    }

    #[test]
    fn created_document_gets_target_from_response() {
        let record = build(
            SyncMethod::Post,
            "/api/vehiculos",
            json!({}),
            json!({"patente": "AB123CD"}),
            json!({"_id": ID, "patente": "AB123CD", "__v": 0}),
        );
        assert_eq!(record.status, OutboxStatus::Pending);
        assert_eq!(record.target_id(), Some(ID));
        assert_eq!(record.params.get("id"), Some(&json!(ID)));
        assert_eq!(record.document.get("_id"), Some(&json!(ID)));
        assert!(!record.document.contains_key("__v"));
        assert!(!record.params.contains_key("segments"));
        assert!(!record.is_bulk());
    }

    #[test]
    fn conflicting_id_is_dropped() {
        let record = build(
            SyncMethod::Put,
            &format!("/api/vehiculos/{ID}"),
            json!({}),
            json!({}),
            json!({"_id": ID, "id": OTHER, "patente": "ZZ999ZZ"}),
        );
        assert_eq!(record.target_id(), Some(ID));
        assert_eq!(record.document.get("_id"), Some(&json!(ID)));
        assert!(!record.document.contains_key("id"));
        assert_eq!(record.params.get("segments"), Some(&json!([ID])));
    }

    #[test]
    fn nested_action_keeps_the_created_identifier() {
        let mutation_body = json!({"cocheraId": OTHER});
        let query = Map::new();
        let path = format!("/api/cocheras/asignar/{ID}");
        let mutation = Mutation {
            method: SyncMethod::Post,
            path: &path,
            raw_query: None,
            query: &query,
            body: &mutation_body,
            actor: None,
        };
        let assigned = "0123456789abcdef01234567";
        let record = build_record_at(
            &mutation,
            &route("/api/cocheras/asignar", "cocherasasignaciones"),
            &json!({"_id": assigned, "cliente": ID, "cochera": OTHER}),
            &ReconstructPolicy::default(),
            "2025-01-01T00:00:00Z".to_string(),
        );
        assert_eq!(record.target_id(), Some(assigned));
        assert_eq!(record.params.get("id"), Some(&json!(assigned)));
        assert_eq!(record.document.get("_id"), Some(&json!(assigned)));
        assert_eq!(record.params.get("segments"), Some(&json!([ID])));
    }

    #[test]
    fn path_identifier_is_used_when_document_has_none() {
        let record = build(
            SyncMethod::Put,
            &format!("/api/vehiculos/{ID}"),
            json!({}),
            json!({"patente": "ZZ999ZZ"}),
            json!("OK"),
        );
        assert_eq!(record.target_id(), Some(ID));
        assert_eq!(record.document.get("_id"), Some(&json!(ID)));
        assert_eq!(record.document.get("patente"), Some(&json!("ZZ999ZZ")));
    }

    #[test]
    fn delete_with_path_identifier_is_targeted() {
        let record = build(
            SyncMethod::Delete,
            &format!("/api/vehiculos/{ID}"),
            json!({}),
            json!(null),
            json!({"message": "Vehiculo eliminado"}),
        );
        assert_eq!(record.target_id(), Some(ID));
        assert!(!record.is_bulk());
    }

    #[test]
    fn delete_without_identifier_is_bulk() {
        let record = build(
            SyncMethod::Delete,
            "/api/vehiculos",
            json!({"origen": "panel"}),
            json!(null),
            json!({"message": "Todos los vehiculos eliminados"}),
        );
        assert!(record.is_bulk());
        assert_eq!(record.target_id(), None);
        assert!(!record.params.contains_key("_id"));
        assert!(record.document.is_empty());
        assert_eq!(record.query.get("origen"), Some(&json!("panel")));
        assert!(!record.query.contains_key("filter"));
    }

    #[test]
    fn bulk_delete_carries_filter() {
        let record = build(
            SyncMethod::Delete,
            "/api/vehiculos",
            json!({}),
            json!({"filter": {"tipoVehiculo": "moto"}}),
            json!({"message": "ok"}),
        );
        assert!(record.is_bulk());
        assert_eq!(record.query.get("filter"), Some(&json!({"tipoVehiculo": "moto"})));

        let record = build(
            SyncMethod::Delete,
            "/api/vehiculos",
            json!({}),
            json!({"tipoVehiculo": "auto"}),
            json!({"message": "ok"}),
        );
        assert_eq!(record.query.get("filter"), Some(&json!({"tipoVehiculo": "auto"})));
    }

    #[test]
    fn non_delete_never_sets_bulk() {
        let record = build(
            SyncMethod::Post,
            "/api/vehiculos/reset",
            json!({"bulk": "true"}),
            json!(null),
            json!({"message": "ok"}),
        );
        assert!(!record.query.contains_key("bulk"));
        assert_eq!(record.target_id(), None);
        assert!(record.document.is_empty());
    }

    #[test]
    fn request_body_identifier_is_used_when_response_lacks_one() {
        let record = build(
            SyncMethod::Patch,
            "/api/vehiculos/estado",
            json!({}),
            json!({"_id": {"$oid": ID.to_uppercase()}, "estado": "fuera"}),
            json!({"message": "Estado actualizado"}),
        );
        assert_eq!(record.target_id(), Some(ID));
        assert_eq!(record.document.get("_id"), Some(&json!(ID)));
        assert_eq!(record.document.get("estado"), Some(&json!("fuera")));
    }

    #[test]
    fn route_keeps_query_string() {
        let query = Map::new();
        let body = Value::Null;
        let mutation = Mutation {
            method: SyncMethod::Post,
            path: "/api/vehiculos",
            raw_query: Some("a=1&b=2"),
            query: &query,
            body: &body,
            actor: None,
        };
        assert_eq!(mutation.route(), "/api/vehiculos?a=1&b=2");
    }

    #[test]
    fn created_at_is_rfc3339() {
        let query = Map::new();
        let body = json!({"_id": ID});
        let mutation = Mutation {
            method: SyncMethod::Post,
            path: "/api/vehiculos",
            raw_query: None,
            query: &query,
            body: &body,
            actor: None,
        };
        let record = build_record(
            &mutation,
            &route("/api/vehiculos", "vehiculos"),
            &Value::Null,
            &ReconstructPolicy::default(),
        );
        let parsed = time::OffsetDateTime::parse(
            &record.created_at,
            &time::format_description::well_known::Rfc3339,
        );
        assert!(parsed.is_ok(), "bad timestamp {}", record.created_at);
    }
}
