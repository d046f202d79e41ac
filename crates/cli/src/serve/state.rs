//! Shared server state: interceptor configuration and the local store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parksync_core::{ReconstructPolicy, RouteTable};
use parksync_storage::OutboxStore;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// Everything the outbox middleware needs. Built once at startup.
pub(crate) struct InterceptState {
    pub(crate) routes: RouteTable,
    pub(crate) policy: ReconstructPolicy,
    pub(crate) outbox: Arc<dyn OutboxStore>,
    /// Largest request body buffered for reconstruction.
    pub(crate) max_body_bytes: usize,
    /// Largest response body captured; bigger responses are forwarded
    /// but reconstructed from the request alone.
    pub(crate) max_capture_bytes: usize,
}

/// Documents of one collection keyed by their hex identifier.
type Collection = BTreeMap<String, Map<String, Value>>;

/// In-memory document store standing in for the local database.
#[derive(Default)]
pub(crate) struct LocalStore {
    pub(crate) collections: RwLock<HashMap<String, Collection>>,
}
