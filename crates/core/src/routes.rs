//! Route classification: request path → logical collection.
//!
//! The table is built once at startup and never mutated. Prefixes are sorted
//! by decreasing length so a nested action route (`/api/cocheras/asignar`)
//! always wins over its parent (`/api/cocheras`), independent of the order in
//! which entries were registered.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Query parameter name that marks a request "local only" by default.
pub const DEFAULT_LOCAL_ONLY_PARAM: &str = "localOnly";

/// Header name that marks a request "local only" by default.
pub const DEFAULT_LOCAL_ONLY_HEADER: &str = "x-local-only";

/// How a caller opts a single request out of interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalOnlySignal {
    pub query_param: String,
    /// Header name, compared case-insensitively by the HTTP layer.
    pub header: String,
}

impl Default for LocalOnlySignal {
    fn default() -> Self {
        Self {
            query_param: DEFAULT_LOCAL_ONLY_PARAM.to_string(),
            header: DEFAULT_LOCAL_ONLY_HEADER.to_string(),
        }
    }
}

impl LocalOnlySignal {
    /// True if the query string or the header value sets the flag.
    ///
    /// Any value other than `0`, `false` or `no` counts as set, including an
    /// empty one (`?localOnly`).
    pub fn is_set(&self, query: &Map<String, Value>, header_value: Option<&str>) -> bool {
        let from_query = query
            .get(&self.query_param)
            .map(|v| match v {
                Value::String(s) => truthy(s),
                Value::Bool(b) => *b,
                _ => true,
            })
            .unwrap_or(false);
        from_query || header_value.map(truthy).unwrap_or(false)
    }
}

fn truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no"
    )
}

/// A successful prefix match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub prefix: String,
    pub collection: String,
}

impl RouteMatch {
    /// Non-empty path segments after the matched prefix.
    pub fn segments<'p>(&self, path: &'p str) -> Vec<&'p str> {
        path.get(self.prefix.len()..)
            .unwrap_or("")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The caller asked for this request to stay local.
    LocalOnly,
    /// The path is on the exclusion list.
    Excluded,
    /// No routing-table prefix matches.
    Unmapped,
    Mapped(RouteMatch),
}

impl Classification {
    pub fn route(&self) -> Option<&RouteMatch> {
        match self {
            Self::Mapped(m) => Some(m),
            _ => None,
        }
    }
}

/// Immutable routing table, exclusion list and local-only signal.
#[derive(Debug, Clone)]
pub struct RouteTable {
    /// (prefix, collection), longest prefix first.
    entries: Vec<(String, String)>,
    exclusions: Vec<String>,
    local_only: LocalOnlySignal,
}

impl RouteTable {
    pub fn new<R, E>(routes: R, exclusions: E, local_only: LocalOnlySignal) -> Self
    where
        R: IntoIterator<Item = (String, String)>,
        E: IntoIterator<Item = String>,
    {
        // BTreeMap dedups prefixes and gives a deterministic tie-break order.
        let unique: BTreeMap<String, String> = routes.into_iter().collect();
        let mut entries: Vec<(String, String)> = unique.into_iter().collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            entries,
            exclusions: exclusions.into_iter().collect(),
            local_only,
        }
    }

    pub fn local_only(&self) -> &LocalOnlySignal {
        &self.local_only
    }

    /// Registered (prefix, collection) pairs, longest prefix first.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    /// True if `collection` is one of the table's values.
    pub fn has_collection(&self, collection: &str) -> bool {
        self.entries.iter().any(|(_, c)| c == collection)
    }

    /// Classify `path` (without query string).
    ///
    /// Check order: local-only flag, exclusion list, longest prefix.
    pub fn classify(&self, path: &str, local_only: bool) -> Classification {
        if local_only {
            return Classification::LocalOnly;
        }
        if self.is_excluded(path) {
            return Classification::Excluded;
        }
        self.lookup(path)
            .map(Classification::Mapped)
            .unwrap_or(Classification::Unmapped)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions.iter().any(|e| path.starts_with(e.as_str()))
    }

    /// Longest-prefix lookup, ignoring the exclusion list.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch> {
        self.entries
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, collection)| RouteMatch {
                prefix: prefix.clone(),
                collection: collection.clone(),
            })
    }
}
