//! HTTP middleware: actor extraction and the write-ahead outbox interceptor.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Query, State};
use axum::http::{Request, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parksync_core::{
    build_record, AuthenticatedActor, Classification, Mutation, RouteMatch,
};
use parksync_storage::SyncMethod;
use serde_json::{Map, Value};

use super::capture::CaptureBody;
use super::state::InterceptState;

/// Response extension a handler sets to keep a successful mutation local.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SkipOutbox;

/// Header carrying the authenticated user id.
const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the authenticated user name.
const ACTOR_USERNAME_HEADER: &str = "x-actor-username";

/// Attach an [`AuthenticatedActor`] from the identity headers, if present.
///
/// Stands in for the session layer of a full deployment, which would
/// resolve the actor from its token instead.
pub(crate) async fn actor_middleware(mut request: Request<Body>, next: Next) -> Response {
    let actor = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        header(ACTOR_ID_HEADER).map(|id| AuthenticatedActor {
            id,
            username: header(ACTOR_USERNAME_HEADER),
        })
    };

    if let Some(actor) = actor {
        request.extensions_mut().insert(actor);
    }
    next.run(request).await
}

/// Outbox interceptor.
///
/// Mutating requests on mapped routes are run through the handler with
/// their body buffered; a successful response is streamed back unchanged
/// while a copy is captured, and one pending record is appended once the
/// response has been fully written. Everything else passes straight through.
pub(crate) async fn outbox_middleware(
    State(state): State<Arc<InterceptState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(method) = SyncMethod::from_http(request.method().as_str()) else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    let raw_query = request.uri().query().map(str::to_string);
    let query = query_map(request.uri());

    let signal = state.routes.local_only();
    let header = request
        .headers()
        .get(signal.header.as_str())
        .and_then(|v| v.to_str().ok());
    let local_only = signal.is_set(&query, header);

    let route = match state.routes.classify(&path, local_only) {
        Classification::Mapped(route) => route,
        outcome => {
            tracing::debug!(%method, %path, ?outcome, "request bypasses outbox");
            return next.run(request).await;
        }
    };

    let actor = request.extensions().get::<AuthenticatedActor>().cloned();

    // Buffer through the same extractor a handler would use, so the
    // router's body limit yields the same rejection with or without us.
    let (parts, body) = request.into_parts();
    let bytes = match Bytes::from_request(Request::from_parts(parts.clone(), body), &()).await {
        Ok(b) => b,
        Err(rejection) => {
            tracing::debug!(%method, %path, %rejection, "request body rejected");
            return rejection.into_response();
        }
    };
    let body = parse_payload(&bytes);
    let request = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(request).await;

    if response.status().is_client_error() || response.status().is_server_error() {
        tracing::debug!(
            %method,
            %path,
            status = response.status().as_u16(),
            "mutation failed; nothing queued"
        );
        return response;
    }
    if response.extensions().get::<SkipOutbox>().is_some() {
        tracing::debug!(%method, %path, "handler kept mutation local");
        return response;
    }

    let pending = PendingAppend {
        state: state.clone(),
        method,
        path,
        raw_query,
        query,
        body,
        actor,
        matched: route,
    };
    let (parts, body) = response.into_parts();
    let body = Body::new(CaptureBody::new(body, state.max_capture_bytes, pending));
    Response::from_parts(parts, body)
}

/// A successful mutation waiting for its response body to finish.
pub(crate) struct PendingAppend {
    state: Arc<InterceptState>,
    method: SyncMethod,
    path: String,
    raw_query: Option<String>,
    query: Map<String, Value>,
    body: Value,
    actor: Option<AuthenticatedActor>,
    matched: RouteMatch,
}

impl PendingAppend {
    fn mutation(&self) -> Mutation<'_> {
        Mutation {
            method: self.method,
            path: &self.path,
            raw_query: self.raw_query.as_deref(),
            query: &self.query,
            body: &self.body,
            actor: self.actor.as_ref(),
        }
    }

    pub(crate) fn route(&self) -> String {
        self.mutation().route()
    }

    /// Queue the append. `captured` is `None` when the response was too
    /// large to keep.
    pub(crate) fn complete(self, captured: Option<Bytes>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.append(captured));
            }
            Err(_) => tracing::error!(
                method = %self.method,
                route = %self.route(),
                collection = %self.matched.collection,
                "no runtime available; outbox record dropped"
            ),
        }
    }

    async fn append(self, captured: Option<Bytes>) {
        let response = captured.map_or(Value::Null, |b| parse_payload(&b));
        let mutation = self.mutation();
        let record = build_record(&mutation, &self.matched, &response, &self.state.policy);
        let target_id = record.target_id().map(str::to_string);

        match self.state.outbox.append(record).await {
            Ok(()) => tracing::debug!(
                method = %self.method,
                route = %mutation.route(),
                collection = %self.matched.collection,
                target_id = ?target_id,
                "outbox record appended"
            ),
            Err(e) => tracing::error!(
                method = %self.method,
                route = %mutation.route(),
                collection = %self.matched.collection,
                target_id = ?target_id,
                error = %e,
                "outbox append failed; mutation not queued for replication"
            ),
        }
    }
}

fn query_map(uri: &Uri) -> Map<String, Value> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(pairs)| {
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// JSON if it parses, the text itself if it does not, null if empty.
fn parse_payload(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
