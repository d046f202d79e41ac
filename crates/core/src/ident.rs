//! Identifier normalization.
//!
//! Handlers and clients refer to entities in several encodings: bare hex
//! strings, `{ "$oid": … }` wrappers, populated sub-documents, serialized
//! byte buffers. [`normalize`] folds every accepted encoding into one
//! [`ObjectId`]; anything else is "not an identifier" and yields `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Number of raw bytes in an identifier.
pub const ID_BYTES: usize = 12;

/// Length of the canonical hex form.
pub const ID_HEX_LEN: usize = ID_BYTES * 2;

/// Nesting bound for wrapped encodings (`{"_id": {"$oid": "…"}}` is depth 2).
const MAX_DEPTH: usize = 4;

/// Keys that may hold an identifier inside an object, in priority order.
const ID_KEYS: [&str; 3] = ["_id", "id", "$oid"];

/// A canonical 12-byte entity identifier.
///
/// Always displayed as 24 lowercase hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; ID_BYTES]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; ID_BYTES] {
        self.0
    }

    /// The canonical 24-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; ID_BYTES]>::try_from(bytes).ok().map(Self)
    }
}

impl From<[u8; ID_BYTES]> for ObjectId {
    fn from(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::String(id.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// Returned by [`ObjectId::from_str`] for text that is not exactly 24 hex characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidObjectId(pub String);

impl fmt::Display for InvalidObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a 24-character hex identifier", self.0)
    }
}

impl std::error::Error for InvalidObjectId {}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_HEX_LEN {
            return Err(InvalidObjectId(s.to_string()));
        }
        hex::decode(s)
            .ok()
            .and_then(|bytes| Self::from_slice(&bytes))
            .ok_or_else(|| InvalidObjectId(s.to_string()))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The identifier encodings accepted at the boundary.
///
/// A `RawId` is produced from an untyped JSON value and resolved once into an
/// [`ObjectId`]; nothing past the boundary inspects raw shapes again.
#[derive(Debug, Clone, PartialEq)]
pub enum RawId<'a> {
    /// Hex text, `ObjectId("…")` text, or a JSON object serialized as text.
    Text(&'a str),
    /// An object that may expose `_id` / `id` / `$oid`, or an indexed byte map.
    Wrapped(&'a Map<String, Value>),
    /// A raw byte sequence.
    Bytes(Vec<u8>),
}

impl<'a> RawId<'a> {
    /// Classify a JSON value into one of the accepted shapes.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s)),
            Value::Object(map) => Some(Self::Wrapped(map)),
            Value::Array(items) => bytes_from_array(items).map(Self::Bytes),
            _ => None,
        }
    }

    /// Resolve to a canonical identifier, or `None` if this shape holds none.
    pub fn resolve(&self) -> Option<ObjectId> {
        self.resolve_at(0)
    }

    fn resolve_at(&self, depth: usize) -> Option<ObjectId> {
        match self {
            Self::Text(s) => resolve_text(s, depth),
            Self::Wrapped(map) => resolve_wrapped(map, depth),
            Self::Bytes(bytes) => ObjectId::from_slice(bytes),
        }
    }
}

/// Normalize any accepted identifier encoding into an [`ObjectId`].
///
/// Never fails loudly: unrecognized shapes, malformed JSON text and objects
/// without an identifying field all return `None`.
pub fn normalize(value: &Value) -> Option<ObjectId> {
    normalize_at(value, 0)
}

/// True if `s` is exactly 24 hexadecimal characters.
pub fn is_hex_id(s: &str) -> bool {
    s.len() == ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn normalize_at(value: &Value, depth: usize) -> Option<ObjectId> {
    if depth > MAX_DEPTH {
        return None;
    }
    RawId::from_value(value)?.resolve_at(depth)
}

fn resolve_text(s: &str, depth: usize) -> Option<ObjectId> {
    if is_hex_id(s) {
        return s.parse().ok();
    }

    // ObjectId("…") / ObjectId('…') as printed by database shells.
    if let Some(inner) = s
        .strip_prefix("ObjectId(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let inner = inner.trim().trim_matches(|c| c == '"' || c == '\'');
        return if is_hex_id(inner) {
            inner.parse().ok()
        } else {
            None
        };
    }

    if s.starts_with('{') {
        let parsed: Value = serde_json::from_str(s).ok()?;
        if parsed.is_object() {
            return normalize_at(&parsed, depth + 1);
        }
    }

    None
}

fn resolve_wrapped(map: &Map<String, Value>, depth: usize) -> Option<ObjectId> {
    for key in ID_KEYS {
        if let Some(id) = map.get(key).and_then(|v| normalize_at(v, depth + 1)) {
            return Some(id);
        }
    }

    if let Some(bytes) = indexed_bytes(map) {
        return ObjectId::from_slice(&bytes);
    }

    // Node-style serialized Buffer: {"type": "Buffer", "data": [..]}
    if map.get("type").and_then(|t| t.as_str()) == Some("Buffer") {
        if let Some(items) = map.get("data").and_then(|d| d.as_array()) {
            return bytes_from_array(items).and_then(|b| ObjectId::from_slice(&b));
        }
    }

    // Driver-level wrapper around the raw bytes: {"buffer": …}
    if let Some(inner) = map.get("buffer") {
        return normalize_at(inner, depth + 1);
    }

    None
}

/// Decode a JSON array of integers in `0..=255`.
fn bytes_from_array(items: &[Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

/// Decode an indexed byte map `{"0": b0, …, "11": b11}` with exactly those keys.
fn indexed_bytes(map: &Map<String, Value>) -> Option<Vec<u8>> {
    if map.len() != ID_BYTES {
        return None;
    }
    (0..ID_BYTES)
        .map(|i| {
            map.get(&i.to_string())
                .and_then(|v| v.as_u64())
                .and_then(|n| u8::try_from(n).ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const HEX: &str = "507f1f77bcf86cd799439011";

    fn id() -> ObjectId {
        HEX.parse().unwrap()
    }

    #[test]
    fn plain_hex_string() {
        assert_eq!(normalize(&json!(HEX)), Some(id()));
    }

    #[test]
    fn uppercase_hex_is_lowercased() {
        let normalized = normalize(&json!(HEX.to_uppercase())).unwrap();
        assert_eq!(normalized.to_hex(), HEX);
    }

    #[test]
    fn wrong_length_or_alphabet_rejected() {
        assert_eq!(normalize(&json!(&HEX[..23])), None);
        assert_eq!(normalize(&json!(format!("{HEX}0"))), None);
        assert_eq!(normalize(&json!("zz7f1f77bcf86cd799439011")), None);
        assert_eq!(normalize(&json!(format!(" {HEX} "))), None);
        assert_eq!(normalize(&json!(format!("{HEX}\n"))), None);
    }

    #[test]
    fn wrapped_objects() {
        assert_eq!(normalize(&json!({"_id": HEX})), Some(id()));
        assert_eq!(normalize(&json!({"id": HEX})), Some(id()));
        assert_eq!(normalize(&json!({"$oid": HEX})), Some(id()));
        assert_eq!(normalize(&json!({"_id": {"$oid": HEX}})), Some(id()));
        assert_eq!(
            normalize(&json!({"_id": HEX, "nombre": "Jane", "email": "j@x.com"})),
            Some(id())
        );
    }

    #[test]
    fn underscore_id_wins_over_id() {
        let other = "65a1b2c3d4e5f60718293a4b";
        assert_eq!(normalize(&json!({"id": other, "_id": HEX})), Some(id()));
    }

    #[test]
    fn byte_encodings() {
        let bytes = id().bytes();
        let array: Vec<u8> = bytes.to_vec();
        assert_eq!(normalize(&json!(array)), Some(id()));

        let mut indexed = Map::new();
        for (i, b) in bytes.iter().enumerate() {
            indexed.insert(i.to_string(), json!(b));
        }
        assert_eq!(normalize(&Value::Object(indexed.clone())), Some(id()));
        assert_eq!(normalize(&json!({"buffer": indexed})), Some(id()));
        assert_eq!(
            normalize(&json!({"type": "Buffer", "data": array})),
            Some(id())
        );
    }

    #[test]
    fn short_or_out_of_range_bytes_rejected() {
        assert_eq!(normalize(&json!([1, 2, 3])), None);
        assert_eq!(normalize(&json!([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 256])), None);
        assert_eq!(normalize(&json!([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, -1])), None);
    }

    #[test]
    fn json_text_is_parsed() {
        let text = format!(r#"{{"_id": "{HEX}"}}"#);
        assert_eq!(normalize(&json!(text)), Some(id()));
        let text = format!(r#"{{"$oid": "{HEX}"}}"#);
        assert_eq!(normalize(&json!(text)), Some(id()));
    }

    #[test]
    fn json_lookalike_text_is_not_an_identifier() {
        assert_eq!(normalize(&json!(format!("{{\"_id\": \"{HEX}\""))), None);
        assert_eq!(normalize(&json!(r#"{"nombre": "Jane"}"#)), None);
    }

    #[test]
    fn shell_printed_form() {
        assert_eq!(normalize(&json!(format!("ObjectId(\"{HEX}\")"))), Some(id()));
        assert_eq!(normalize(&json!(format!("ObjectId('{HEX}')"))), Some(id()));
        assert_eq!(normalize(&json!("ObjectId(\"nope\")")), None);
    }

    #[test]
    fn other_shapes_are_not_identifiers() {
        assert_eq!(normalize(&json!(null)), None);
        assert_eq!(normalize(&json!(42)), None);
        assert_eq!(normalize(&json!(true)), None);
        assert_eq!(normalize(&json!({})), None);
        assert_eq!(normalize(&json!({"nombre": "Jane"})), None);
    }

    #[test]
    fn nesting_is_bounded() {
        let mut value = json!(HEX);
        for _ in 0..10 {
            value = json!({ "_id": value });
        }
        assert_eq!(normalize(&value), None);
    }

    #[test]
    fn serde_as_hex_string() {
        let value = serde_json::to_value(id()).unwrap();
        assert_eq!(value, json!(HEX));
        let back: ObjectId = serde_json::from_value(value).unwrap();
        assert_eq!(back, id());
        assert!(serde_json::from_value::<ObjectId>(json!("short")).is_err());
    }

    proptest! {
        #[test]
        fn hex_and_wrapped_bytes_agree(bytes in proptest::array::uniform12(any::<u8>())) {
            let hex_form = normalize(&json!(hex::encode(bytes)));
            let wrapped = normalize(&json!({ "_id": bytes.to_vec() }));
            prop_assert_eq!(hex_form, Some(ObjectId::from_bytes(bytes)));
            prop_assert_eq!(wrapped, hex_form);
            prop_assert_eq!(hex_form.map(|id| id.to_hex()), Some(hex::encode(bytes)));
        }
    }
}
