use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HTTP methods whose effects are queued for replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl SyncMethod {
    /// Parse an HTTP method name. Returns `None` for non-mutating methods.
    pub fn from_http(method: &str) -> Option<Self> {
        match method {
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an outbox record.
///
/// Records are always created as `Pending`. The other states belong to the
/// replication consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Synced,
    Error,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown outbox status '{other}'")),
        }
    }
}

/// One queued mutation awaiting replication to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub method: SyncMethod,
    /// Request path including the query string, verbatim.
    pub route: String,
    pub collection: String,
    #[serde(default)]
    pub document: Map<String, Value>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    pub status: OutboxStatus,
    /// ISO 8601 / RFC 3339 timestamp string.
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl OutboxRecord {
    /// Canonical identifier of the affected entity, if one was resolved.
    pub fn target_id(&self) -> Option<&str> {
        self.params
            .get("_id")
            .or_else(|| self.params.get("id"))
            .and_then(|v| v.as_str())
    }

    /// True when the record describes a collection-wide delete.
    pub fn is_bulk(&self) -> bool {
        self.query.get("bulk").and_then(|v| v.as_bool()) == Some(true)
    }
}
