//! Response shape analysis: envelope vs domain document.
//!
//! Classification is an explicit ordered rule list. The first rule that
//! produces a verdict wins; a body no rule recognizes is `Unrecognized` and
//! the reconstructor falls back to the request body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ident::normalize;

/// Verdict for a captured response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// Status/transport metadata only; nothing to extract.
    Envelope,
    /// A domain entity (or a wrapper around one).
    Document,
    Unrecognized,
}

/// Key sets driving [`ShapeRules::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRules {
    /// Identifier fields of a domain document.
    pub identifying_keys: Vec<String>,
    /// Relation fields that only domain documents carry.
    pub relation_keys: Vec<String>,
    /// Keys under which handlers nest the real document.
    pub wrapper_keys: Vec<String>,
    /// Status/transport keys of a bare envelope.
    pub envelope_keys: Vec<String>,
}

impl Default for ShapeRules {
    fn default() -> Self {
        Self {
            identifying_keys: strings(&["_id", "id"]),
            relation_keys: strings(&["operador", "cliente", "vehiculo", "abono", "user"]),
            wrapper_keys: strings(&[
                "document",
                "result",
                "data",
                "item",
                "payload",
                "cierre",
                "movimiento",
                "registro",
            ]),
            envelope_keys: strings(&["message", "ok", "token", "status", "error"]),
        }
    }
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One step of the ordered classification.
#[derive(Debug, Clone, Copy)]
enum Rule {
    NotAnObject,
    EmptyObject,
    HasDomainKey,
    EnvelopeKeysOnly,
    CarriesIdentifier,
}

const RULES: [Rule; 5] = [
    Rule::NotAnObject,
    Rule::EmptyObject,
    Rule::HasDomainKey,
    Rule::EnvelopeKeysOnly,
    Rule::CarriesIdentifier,
];

impl ShapeRules {
    /// Classify a captured response body.
    pub fn classify(&self, body: &Value) -> ResponseShape {
        RULES
            .iter()
            .find_map(|rule| self.apply(*rule, body))
            .unwrap_or(ResponseShape::Unrecognized)
    }

    fn apply(&self, rule: Rule, body: &Value) -> Option<ResponseShape> {
        let map = body.as_object();
        match rule {
            Rule::NotAnObject => map.is_none().then_some(ResponseShape::Unrecognized),
            Rule::EmptyObject => map
                .filter(|m| m.is_empty())
                .map(|_| ResponseShape::Envelope),
            Rule::HasDomainKey => map
                .filter(|m| self.has_domain_key(m))
                .map(|_| ResponseShape::Document),
            Rule::EnvelopeKeysOnly => map
                .filter(|m| m.keys().all(|k| contains(&self.envelope_keys, k)))
                .map(|_| ResponseShape::Envelope),
            Rule::CarriesIdentifier => normalize(body).map(|_| ResponseShape::Document),
        }
    }

    fn has_domain_key(&self, map: &Map<String, Value>) -> bool {
        map.keys().any(|k| {
            contains(&self.identifying_keys, k)
                || contains(&self.relation_keys, k)
                || contains(&self.wrapper_keys, k)
        })
    }

    /// True if `value` is an object with a non-null identifying field.
    pub fn carries_identifier(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|m| {
            self.identifying_keys
                .iter()
                .any(|k| m.get(k).is_some_and(|v| !v.is_null()))
        })
    }
}

fn contains(set: &[String], key: &str) -> bool {
    set.iter().any(|s| s == key)
}
