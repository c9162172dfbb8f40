// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! The `/_hds` HTTP surface: an `axum::Router` mapping the wire protocol
//! onto [`crate::core::handler::Handler`] and [`crate::core::store::Store`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, put, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::core::error::{ErrorKind, HdsError};
use crate::core::handler::Handler;
use crate::core::store::{Store, SubtopicMatch};
use crate::core::types::Payload;
use crate::federation::FederationClient;
use crate::monitoring::metrics::Metrics;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    /// Admission pipeline.
    pub handler: Arc<Handler>,
    /// Persistent store, queried directly by read-only routes.
    pub store: Arc<Store>,
    /// This node's own identifier, returned by `GET /identify`.
    pub server_key: String,
    /// Prometheus metrics.
    pub metrics: Arc<Metrics>,
    /// Outbound federation client, used by `POST /register`.
    pub federation: Option<Arc<FederationClient>>,
}

/// Build the router: the 8 protocol endpoints under `/_hds`, plus `/metrics`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_hds/identify", get(identify))
        .route("/_hds/topics", get(list_topics))
        .route("/_hds/topics/*path", get(topic_hosts))
        .route("/_hds/hosts/:server", get(host_state))
        .route("/_hds/hosts/:server/state/:key", put(put_state))
        .route("/_hds/hosts/:server/topic/:topic", put(put_topic))
        .route("/_hds/register", post(register))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn error_response(err: &HdsError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "hds.error.text": err.message, "hds.error": err.kind.as_str() })),
    )
}

fn require_json_content_type(headers: &HeaderMap) -> Result<(), HdsError> {
    let Some(ct) = headers.get(header::CONTENT_TYPE) else {
        return Err(HdsError::new(ErrorKind::HeadersMissing, "missing Content-Type"));
    };
    let ct = ct.to_str().unwrap_or_default();
    if !ct.starts_with("application/json") {
        return Err(HdsError::new(
            ErrorKind::HeadersUnsupported,
            "unsupported Content-Type",
        ));
    }
    Ok(())
}

/// Check the `Content-Type` header before touching the body at all, then
/// parse it as a JSON object. A body extracted as raw [`Bytes`] (rather than
/// axum's `Json` extractor) is what makes the content-type check reachable:
/// `Json<Value>` rejects a missing/wrong content type itself, before the
/// handler body — and this envelope's own error kinds — ever run.
fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Result<Payload, HdsError> {
    require_json_content_type(headers)?;
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| HdsError::new(ErrorKind::PayloadBadType, "body is not valid JSON"))?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(HdsError::new(
            ErrorKind::PayloadBadType,
            "body must be a JSON object",
        )),
    }
}

async fn identify(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "hds.servername": state.server_key, "hds.type": "hds.directory" }))
}

async fn list_topics(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let topics = state.store.get_topics().map_err(|_| {
        error_response(&HdsError::new(ErrorKind::Unknown, "storage backend error"))
    })?;
    Ok(Json(json!({ "topics": topics })))
}

async fn topic_hosts(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let Some(topic) = segments.next() else {
        return Err(error_response(&HdsError::new(
            ErrorKind::TopicMissing,
            "missing topic",
        )));
    };
    let subtopics: Vec<String> = segments.map(str::to_string).collect();
    let subtopics_arg = if subtopics.is_empty() { None } else { Some(subtopics.as_slice()) };

    let hosts = state
        .store
        .get_topic_hosts(topic, subtopics_arg, SubtopicMatch::PositionalSubstring)
        .map_err(|_| error_response(&HdsError::new(ErrorKind::Unknown, "storage backend error")))?;

    if hosts.is_empty() && !state.store.get_topics().unwrap_or_default().iter().any(|t| t == topic) {
        return Err(error_response(&HdsError::new(
            ErrorKind::TopicMissing,
            "no such topic",
        )));
    }

    state.metrics.topic_queries_total.inc();

    let mut out = Map::new();
    for (host, th) in hosts {
        out.insert(
            host,
            json!({ "hds.signature": th.signature, "subtopics": th.subtopics }),
        );
    }
    Ok(Json(json!({ "hosts": out })))
}

async fn host_state(
    State(state): State<AppState>,
    Path(server): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.store.get_host_state(&server) {
        Ok(host_state) => {
            let mut out = Map::new();
            for (key, record) in host_state.entries {
                out.insert(key, json!(record.value));
            }
            out.insert("hds.expired".to_string(), json!(host_state.expired));
            Ok(Json(Value::Object(out)))
        }
        Err(_) => match state.handler.find_via_federation(&server).await {
            Ok(v) => Ok(Json(v)),
            Err(e) => Err(error_response(&HdsError::new(ErrorKind::HostMissing, e.message))),
        },
    }
}

async fn put_state(
    State(state): State<AppState>,
    Path((server, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let body = parse_json_body(&headers, &body).map_err(|e| error_response(&e))?;

    match state.handler.put_state(&server, &key, &body) {
        Ok(evicted) => {
            state.metrics.state_writes_total.inc();
            if evicted > 0 {
                state.metrics.state_evictions_total.inc_by(evicted as u64);
            }
            if let Ok(n) = state.store.host_count() {
                state.metrics.hosts_known.set(n as i64);
            }
            Ok(StatusCode::CREATED)
        }
        Err(e) => {
            state
                .metrics
                .admission_rejected_total
                .with_label_values(&[e.kind.as_str()])
                .inc();
            Err(error_response(&e))
        }
    }
}

async fn put_topic(
    State(state): State<AppState>,
    Path((server, topic)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let body = parse_json_body(&headers, &body).map_err(|e| error_response(&e))?;

    match state.handler.put_topic(&server, &topic, &body).await {
        Ok(()) => {
            state.metrics.topic_writes_total.inc();
            Ok(StatusCode::CREATED)
        }
        Err(e) => {
            state
                .metrics
                .admission_rejected_total
                .with_label_values(&[e.kind.as_str()])
                .inc();
            Err(error_response(&e))
        }
    }
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let Some(peer) = body.get("host").and_then(Value::as_str) else {
        return Err(error_response(&HdsError::new(
            ErrorKind::PayloadMissingKey,
            "missing host",
        )));
    };
    let Some(federation) = &state.federation else {
        return Err(error_response(&HdsError::new(
            ErrorKind::FederationDisabled,
            "no federation key configured",
        )));
    };

    info!(peer = %peer, "federation registration requested");
    if let Err(e) = federation.put_topic("hds.directory", &[], peer).await {
        tracing::warn!(peer = %peer, error = ?e, "registration push failed");
    }
    Ok(StatusCode::CREATED)
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
