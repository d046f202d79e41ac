//! Document reconstruction.
//!
//! Three sources may describe the effect of a mutation: the handler's
//! response, the original request body, and the authenticated actor. This
//! module merges them into one canonical document with a fixed precedence:
//!
//! 1. response body, if it is a domain document
//! 2. otherwise the request body, if it is an object
//! 3. otherwise an empty object
//! 4. unwrap `{ "document": {...} }`-style envelopes
//! 5. gap-fill auxiliary fields from the request body (never overwrite)
//! 6. actor repair for collections whose handlers omit it
//! 7. flatten populated references to bare identifiers
//! 8. strip bookkeeping fields

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ident::{is_hex_id, normalize};
use crate::shape::{strings, ResponseShape, ShapeRules};

/// Identity attached to the request by the upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedActor {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// The request-side inputs of a reconstruction.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Collection resolved by the route classifier.
    pub collection: &'a str,
    /// Parsed request body (`Value::Null` when absent or not JSON).
    pub body: &'a Value,
    pub actor: Option<&'a AuthenticatedActor>,
}

/// Field sets that drive reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructPolicy {
    pub shape: ShapeRules,
    /// Fields copied from the request body when the base lacks them.
    pub auxiliary_fields: Vec<String>,
    /// Field holding the acting operator.
    pub actor_field: String,
    /// Collections whose handlers are known to omit the actor field.
    pub actor_repair_collections: BTreeSet<String>,
    /// Fields owned by the destination store's own lifecycle.
    pub bookkeeping_fields: Vec<String>,
}

impl Default for ReconstructPolicy {
    fn default() -> Self {
        Self {
            shape: ShapeRules::default(),
            auxiliary_fields: strings(&[
                "operador", "cliente", "vehiculo", "abono", "user", "fecha", "hora",
            ]),
            actor_field: "operador".to_string(),
            actor_repair_collections: ["cierresdecajas".to_string()].into_iter().collect(),
            bookkeeping_fields: strings(&["__v", "createdAt", "updatedAt"]),
        }
    }
}

impl ReconstructPolicy {
    /// Reference fields flattened before persistence.
    pub fn reference_fields(&self) -> &[String] {
        &self.shape.relation_keys
    }
}

/// Produce the canonical document for one intercepted mutation.
pub fn reconstruct_document(
    ctx: &RequestContext<'_>,
    response: &Value,
    policy: &ReconstructPolicy,
) -> Map<String, Value> {
    let mut base = select_base(ctx.body, response, &policy.shape);

    unwrap_nested(&mut base, &policy.shape);
    fill_gaps(&mut base, ctx.body, &policy.auxiliary_fields);
    repair_actor(&mut base, ctx, policy);
    flatten_references(&mut base, policy.reference_fields());

    for field in &policy.bookkeeping_fields {
        base.remove(field);
    }
    base
}

fn select_base(request: &Value, response: &Value, rules: &ShapeRules) -> Map<String, Value> {
    if rules.classify(response) == ResponseShape::Document {
        if let Some(doc) = response.as_object() {
            return doc.clone();
        }
    }
    request.as_object().cloned().unwrap_or_default()
}

/// Replace the base with the first wrapped value that carries an identifier.
fn unwrap_nested(base: &mut Map<String, Value>, rules: &ShapeRules) {
    let nested = rules.wrapper_keys.iter().find_map(|key| {
        base.get(key)
            .filter(|v| rules.carries_identifier(v))
            .and_then(|v| v.as_object())
            .cloned()
    });
    if let Some(inner) = nested {
        tracing::trace!("unwrapped nested document from response envelope");
        *base = inner;
    }
}

fn is_set(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).is_some_and(|v| !v.is_null())
}

fn fill_gaps(base: &mut Map<String, Value>, request: &Value, fields: &[String]) {
    let Some(request) = request.as_object() else {
        return;
    };
    for field in fields {
        if is_set(base, field) {
            continue;
        }
        if let Some(value) = request.get(field).filter(|v| !v.is_null()) {
            base.insert(field.clone(), value.clone());
        }
    }
}

fn repair_actor(
    base: &mut Map<String, Value>,
    ctx: &RequestContext<'_>,
    policy: &ReconstructPolicy,
) {
    if !policy.actor_repair_collections.contains(ctx.collection)
        || is_set(base, &policy.actor_field)
    {
        return;
    }
    let Some(actor) = ctx.actor else {
        tracing::debug!(
            collection = ctx.collection,
            "no authenticated actor available for actor repair"
        );
        return;
    };
    let value = normalize(&Value::String(actor.id.clone()))
        .map(Value::from)
        .unwrap_or_else(|| Value::String(actor.id.clone()));
    base.insert(policy.actor_field.clone(), value);
}

/// Replace populated relation fields with their bare identifier.
///
/// A field whose value yields no identifier is left untouched; it is never
/// cleared.
pub fn flatten_references(doc: &mut Map<String, Value>, fields: &[String]) {
    for field in fields {
        let Some(value) = doc.get_mut(field) else {
            continue;
        };
        match value {
            Value::Object(_) | Value::Array(_) => {
                if let Some(id) = normalize(value) {
                    *value = id.into();
                }
            }
            Value::String(s) if is_hex_id(s) => {
                *s = s.to_ascii_lowercase();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "507f1f77bcf86cd799439011";
    const ACTOR: &str = "65a1b2c3d4e5f60718293a4b";

    fn run(collection: &str, request: Value, response: Value) -> Map<String, Value> {
        run_as(collection, request, response, None)
    }

    fn run_as(
        collection: &str,
        request: Value,
        response: Value,
        actor: Option<&AuthenticatedActor>,
    ) -> Map<String, Value> {
        let ctx = RequestContext {
            collection,
            body: &request,
            actor,
        };
        reconstruct_document(&ctx, &response, &ReconstructPolicy::default())
    }

    #[test]
    fn response_document_is_the_base() {
        let doc = run(
            "vehiculos",
            json!({"patente": "AB123CD", "extra": 1}),
            json!({"_id": ID, "patente": "AB123CD"}),
        );
        assert_eq!(doc.get("_id"), Some(&json!(ID)));
        // Request-only fields outside the auxiliary list are not merged.
        assert!(!doc.contains_key("extra"));
    }

    #[test]
    fn envelope_response_falls_back_to_request() {
        let doc = run(
            "tarifas",
            json!({"nombre": "Hora", "valor": 1200}),
            json!({"message": "Tarifa actualizada"}),
        );
        assert_eq!(doc.get("nombre"), Some(&json!("Hora")));
        assert!(!doc.contains_key("message"));
    }

    #[test]
    fn unparseable_response_text_falls_back_to_request() {
        let doc = run("tarifas", json!({"nombre": "Dia"}), json!("OK"));
        assert_eq!(doc.get("nombre"), Some(&json!("Dia")));
    }

    #[test]
    fn no_object_anywhere_is_empty() {
        assert!(run("tarifas", json!(null), json!("done")).is_empty());
        assert!(run("tarifas", json!([1, 2]), json!([])).is_empty());
    }

    #[test]
    fn gap_fill_never_overwrites() {
        let filled = run(
            "movimientos",
            json!({"_id": ID, "operador": "A"}),
            json!({"_id": ID}),
        );
        assert_eq!(filled.get("operador"), Some(&json!("A")));

        let kept = run(
            "movimientos",
            json!({"_id": ID, "operador": "A"}),
            json!({"_id": ID, "operador": "B"}),
        );
        assert_eq!(kept.get("operador"), Some(&json!("B")));
    }

    #[test]
    fn gap_fill_replaces_null() {
        let doc = run(
            "movimientos",
            json!({"fecha": "2025-03-01", "hora": "10:15"}),
            json!({"_id": ID, "fecha": null}),
        );
        assert_eq!(doc.get("fecha"), Some(&json!("2025-03-01")));
        assert_eq!(doc.get("hora"), Some(&json!("10:15")));
    }

    #[test]
    fn wrapped_document_is_unwrapped() {
        let doc = run(
            "abonos",
            json!({}),
            json!({"message": "Abono creado", "document": {"_id": ID, "precio": 5000}}),
        );
        assert_eq!(doc.get("_id"), Some(&json!(ID)));
        assert_eq!(doc.get("precio"), Some(&json!(5000)));
        assert!(!doc.contains_key("message"));
    }

    #[test]
    fn wrapper_without_identifier_is_kept() {
        let doc = run(
            "abonos",
            json!({}),
            json!({"_id": ID, "data": {"precio": 5000}}),
        );
        assert_eq!(doc.get("_id"), Some(&json!(ID)));
        assert!(doc.contains_key("data"));
    }

    #[test]
    fn cash_closing_gets_actor_from_session() {
        let actor = AuthenticatedActor {
            id: ACTOR.to_uppercase(),
            username: Some("caja1".to_string()),
        };
        let doc = run_as(
            "cierresdecajas",
            json!({"totalRecaudado": 1000}),
            json!({"_id": ID, "totalRecaudado": 1000}),
            Some(&actor),
        );
        assert_eq!(doc.get("operador"), Some(&json!(ACTOR)));
    }

    #[test]
    fn actor_repair_prefers_request_gap_fill() {
        let actor = AuthenticatedActor {
            id: ACTOR.to_string(),
            username: None,
        };
        let other = "0123456789abcdef01234567";
        let doc = run_as(
            "cierresdecajas",
            json!({"operador": other}),
            json!({"_id": ID}),
            Some(&actor),
        );
        assert_eq!(doc.get("operador"), Some(&json!(other)));
    }

    #[test]
    fn actor_repair_only_for_configured_collections() {
        let actor = AuthenticatedActor {
            id: ACTOR.to_string(),
            username: None,
        };
        let doc = run_as("movimientos", json!({}), json!({"_id": ID}), Some(&actor));
        assert!(!doc.contains_key("operador"));
    }

    #[test]
    fn populated_references_are_flattened() {
        let doc = run(
            "abonos",
            json!({}),
            json!({
                "_id": ID,
                "cliente": {"_id": ID, "nombre": "Jane"},
                "vehiculo": {"_id": {"$oid": ACTOR}, "patente": "AB123CD"},
                "operador": {"username": "no-id"},
            }),
        );
        assert_eq!(doc.get("cliente"), Some(&json!(ID)));
        assert_eq!(doc.get("vehiculo"), Some(&json!(ACTOR)));
        assert_eq!(doc.get("operador"), Some(&json!({"username": "no-id"})));
    }

    #[test]
    fn bookkeeping_fields_are_stripped() {
        let doc = run(
            "clientes",
            json!({}),
            json!({
                "_id": ID,
                "__v": 3,
                "createdAt": "2025-01-01T00:00:00Z",
                "updatedAt": "2025-01-02T00:00:00Z",
                "nombre": "Jane",
            }),
        );
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "nombre"]);
    }

    #[test]
    fn flatten_lowercases_hex_and_skips_other_values() {
        let mut doc = json!({
            "cliente": ID.to_uppercase(),
            "user": 7,
            "abono": null,
        })
        .as_object()
        .cloned()
        .unwrap();
        flatten_references(&mut doc, &ReconstructPolicy::default().shape.relation_keys);
        assert_eq!(doc.get("cliente"), Some(&json!(ID)));
        assert_eq!(doc.get("user"), Some(&json!(7)));
        assert_eq!(doc.get("abono"), Some(&json!(null)));
    }
}
