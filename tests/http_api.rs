//! End-to-end tests of the `/_hds` HTTP surface, driven directly through the
//! `axum::Router` via `tower::ServiceExt::oneshot` rather than a bound socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hds::core::handler::Handler;
use hds::core::security::keystore::Keystore;
use hds::core::store::Store;
use hds::core::types::Payload;
use hds::http::{router, AppState};
use hds::monitoring::metrics::Metrics;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tower::ServiceExt;

/// `ring` cannot generate RSA keys, so integration tests reach for the `rsa`
/// crate's pure-Rust keygen and re-encode to the PKCS#8 bytes
/// `Keystore::load_from_pkcs8` expects — the same approach the keystore's own
/// in-crate unit tests use.
fn generate_pkcs8_der() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, 2048).expect("rsa keygen");
    key.to_pkcs8_der().expect("pkcs8 encode").as_bytes().to_vec()
}

struct Fixture {
    app: axum::Router,
    ks: Keystore,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().to_str().unwrap()).unwrap());
    let ks = Keystore::load_from_pkcs8(&generate_pkcs8_der()).unwrap();
    let handler = Arc::new(Handler::new(store.clone(), None));
    let metrics = Arc::new(Metrics::new().unwrap());
    let server_key = ks.server_key().to_string();
    let state = AppState {
        handler,
        store,
        server_key,
        metrics,
        federation: None,
    };
    Fixture {
        app: router(state),
        ks,
        _dir: dir,
    }
}

fn signed(ks: &Keystore, body: Value) -> Payload {
    let mut payload: Payload = match body {
        Value::Object(m) => m,
        _ => unreachable!(),
    };
    ks.sign_payload(&mut payload).unwrap();
    payload
}

fn put(path: String, body: &Payload) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn identify_reports_own_server_key() {
    let Fixture { app, ks, .. } = fixture();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/_hds/identify")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["hds.servername"], json!(ks.server_key()));
    assert_eq!(body["hds.type"], json!("hds.directory"));
}

#[tokio::test]
async fn state_write_then_read_round_trips() {
    let Fixture { app, ks, .. } = fixture();
    let host = ks.server_key().to_string();

    let host_body = signed(&ks, json!({"hds.ttl": 3600, "hds.host": host}));
    let resp = app
        .clone()
        .oneshot(put(
            format!("/_hds/hosts/{host}/state/hds.host"),
            &host_body,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let name_body = signed(&ks, json!({"hds.ttl": 3600, "hds.name": "Example Directory"}));
    let resp = app
        .clone()
        .oneshot(put(
            format!("/_hds/hosts/{host}/state/hds.name"),
            &name_body,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/_hds/hosts/{host}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["hds.name"], json!("Example Directory"));
    assert_eq!(body["hds.expired"], json!(Vec::<String>::new()));
}

#[tokio::test]
async fn tampered_signature_is_rejected_with_bad_signature_kind() {
    let Fixture { app, ks, .. } = fixture();
    let host = ks.server_key().to_string();
    let mut body = signed(&ks, json!({"hds.ttl": 3600, "hds.host": host}));
    body.insert("hds.signature".to_string(), json!("bm90YXJlYWxzaWc="));

    let resp = app
        .oneshot(put(format!("/_hds/hosts/{host}/state/hds.host"), &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["hds.error"], json!("hds.error.payload.bad_signature"));
}

#[tokio::test]
async fn topic_membership_visible_with_subtopic_filter() {
    let Fixture { app, ks, .. } = fixture();
    let host = ks.server_key().to_string();

    let host_body = signed(&ks, json!({"hds.ttl": 3600, "hds.host": host}));
    app.clone()
        .oneshot(put(
            format!("/_hds/hosts/{host}/state/hds.host"),
            &host_body,
        ))
        .await
        .unwrap();

    let topic_body = signed(
        &ks,
        json!({"hds.chat": ["production-eu", "v2"]}),
    );
    let resp = app
        .clone()
        .oneshot(put(
            format!("/_hds/hosts/{host}/topic/hds.chat"),
            &topic_body,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/_hds/topics/hds.chat/prod")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["hosts"].get(&host).is_some());

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/_hds/topics/hds.nosuch")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tombstone_blocks_subsequent_writes() {
    let Fixture { app, ks, .. } = fixture();
    let host = ks.server_key().to_string();

    let host_body = signed(&ks, json!({"hds.ttl": 3600, "hds.host": host}));
    app.clone()
        .oneshot(put(
            format!("/_hds/hosts/{host}/state/hds.host"),
            &host_body,
        ))
        .await
        .unwrap();

    let tombstone_body = signed(&ks, json!({"hds.ttl": 3600, "hds.tombstone": "retired"}));
    let resp = app
        .clone()
        .oneshot(put(
            format!("/_hds/hosts/{host}/state/hds.tombstone"),
            &tombstone_body,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let name_body = signed(&ks, json!({"hds.ttl": 3600, "hds.name": "too late"}));
    let resp = app
        .oneshot(put(
            format!("/_hds/hosts/{host}/state/hds.name"),
            &name_body,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["hds.error"], json!("hds.error.host.tombstone"));
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let Fixture { app, .. } = fixture();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("hds_state_writes_total"));
}
