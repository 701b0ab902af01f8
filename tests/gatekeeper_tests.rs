//! End-to-end tests for the gatekeeper pipeline and the order API.
//!
//! The full router runs in-process over in-memory stores and a manual clock,
//! driven with `tower::ServiceExt::oneshot`. No external services needed.
//!
//! Run with: `cargo test --test gatekeeper_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;

use checkout::gate::ManualClock;
use checkout::store::{
    CounterStore, InMemoryCounterStore, InMemoryCredentialStore, InMemoryOrderRepository,
    StoreError,
};
use checkout::{AppState, Config, ErrorBody, SecretScheme, Stores, build_router};

/// Start of a 60s window, so tests never straddle a boundary by accident.
const WINDOW_START: u64 = 1_700_000_040;

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new(config: Config) -> Self {
        Self::with_counter(config, Arc::new(InMemoryCounterStore::new()))
    }

    fn with_counter(config: Config, counter: Arc<dyn CounterStore>) -> Self {
        let stores = Stores {
            counter,
            credentials: Arc::new(InMemoryCredentialStore::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
        };
        let clock = Arc::new(ManualClock::new(WINDOW_START));
        let state = AppState::with_clock(config, stores, clock.clone());

        Self {
            router: build_router(state),
            clock,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        Reply {
            status,
            headers,
            body,
        }
    }

    async fn register(&self, username: &str, secret: &str) -> Reply {
        self.send(
            Method::POST,
            "/register",
            None,
            Some(json!({ "username": username, "secret": secret })),
        )
        .await
    }
}

fn config(limit: u64) -> Config {
    Config {
        rate_limit_per_window: limit,
        secret_scheme: SecretScheme::Plaintext,
        ..Config::default()
    }
}

fn basic(username: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{secret}")))
}

fn order(order_id: i64, customer: &str) -> Value {
    json!({
        "order_id": order_id,
        "customer": customer,
        "product_name": "widget",
        "quantity": 2,
        "unit_price": "19.99",
        "order_date": "2024-05-01",
        "priority": "high"
    })
}

fn error_body(reply: &Reply) -> ErrorBody {
    serde_json::from_value(reply.body.clone()).expect("structured error body")
}

/// Counter store that is always down.
struct DownCounter;

#[async_trait]
impl CounterStore for DownCounter {
    async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn expire_after(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[tokio::test]
async fn test_register_order_and_exhaust_limit() {
    let app = TestApp::new(config(5));
    let bob = basic("bob", "pw1");

    // 1
    let reply = app.register("bob", "pw1").await;
    assert_eq!(reply.status, StatusCode::CREATED);

    // 2
    let reply = app.register("bob", "pw2").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_body(&reply).message, "username exists");

    // 3
    let reply = app
        .send(Method::POST, "/api/orders", Some(&bob), Some(order(1, "acme")))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["order_id"], 1);

    // 4
    let reply = app
        .send(Method::GET, "/api/orders/999", Some(&bob), None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(error_body(&reply).path, "/api/orders/999");

    // 5
    let reply = app.send(Method::GET, "/api/orders", Some(&bob), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-ratelimit-remaining"], "0");

    // 6: over the limit
    let reply = app.send(Method::GET, "/api/orders", Some(&bob), None).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.headers["x-ratelimit-limit"], "5");
    assert_eq!(reply.headers["x-ratelimit-remaining"], "0");
    assert_eq!(reply.headers["retry-after"], "60");
    let body = error_body(&reply);
    assert_eq!(body.status, 429);
    assert_eq!(body.path, "/api/orders");
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_next_window_is_unaffected() {
    let app = TestApp::new(config(1));

    assert_eq!(app.send(Method::GET, "/health", None, None).await.status, StatusCode::OK);
    assert_eq!(
        app.send(Method::GET, "/health", None, None).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );

    app.clock.advance(Duration::from_secs(60));

    assert_eq!(app.send(Method::GET, "/health", None, None).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_retry_after_counts_down() {
    let app = TestApp::new(config(1));
    app.send(Method::GET, "/health", None, None).await;

    app.clock.advance(Duration::from_secs(45));
    let reply = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.headers["retry-after"], "15");
}

#[tokio::test]
async fn test_rejected_requests_still_consume_the_window() {
    let app = TestApp::new(config(2));

    // Unauthenticated requests are counted before authentication runs.
    for _ in 0..2 {
        let reply = app.send(Method::GET, "/api/orders", None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }
    let reply = app.send(Method::GET, "/api/orders", None, None).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_counter_store_down_fails_closed() {
    let app = TestApp::with_counter(config(10), Arc::new(DownCounter));

    let reply = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    let body = error_body(&reply);
    assert_eq!(body.status, 503);
    assert!(!body.message.contains("connection refused"));
}

#[tokio::test]
async fn test_counter_store_down_fails_open_when_configured() {
    let config = Config {
        rate_limit_fail_open: true,
        ..config(10)
    };
    let app = TestApp::with_counter(config, Arc::new(DownCounter));

    let reply = app.register("bob", "pw1").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert!(reply.headers.get("x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn test_zero_limit_disables_rate_limiting() {
    let app = TestApp::with_counter(config(0), Arc::new(DownCounter));

    for _ in 0..5 {
        let reply = app.register("bob", "pw1").await;
        assert_ne!(reply.status, StatusCode::TOO_MANY_REQUESTS);
        assert_ne!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_credentials() {
    let app = TestApp::new(config(100));

    let reply = app.send(Method::GET, "/api/orders", None, None).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        reply.headers["www-authenticate"],
        r#"Basic realm="checkout""#
    );
    let body = error_body(&reply);
    assert_eq!(body.message, "not authorized");
    assert_eq!(body.error, "no credentials provided");
}

#[tokio::test]
async fn test_empty_header() {
    let app = TestApp::new(config(100));
    let reply = app.send(Method::GET, "/api/orders", Some(""), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_base64() {
    let app = TestApp::new(config(100));
    let reply = app
        .send(Method::GET, "/api/orders", Some("Basic %%%"), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(&reply).error, "malformed credentials");
}

#[tokio::test]
async fn test_payload_without_colon_is_bad_request() {
    let app = TestApp::new(config(100));
    let header = format!("Basic {}", STANDARD.encode("bobpw1"));

    let reply = app
        .send(Method::GET, "/api/orders", Some(&header), None)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(&reply).message,
        "not authorized, check credentials"
    );
}

#[tokio::test]
async fn test_wrong_secret_and_unknown_user() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let reply = app
        .send(Method::GET, "/api/orders", Some(&basic("bob", "nope")), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(&reply).error, "wrong password");

    let reply = app
        .send(Method::GET, "/api/orders", Some(&basic("eve", "pw1")), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(&reply).error, "user not found");
}

#[tokio::test]
async fn test_non_ascii_header_is_counted_and_ignored_on_public_paths() {
    let app = TestApp::new(config(1));
    let opaque = HeaderValue::from_bytes(b"Basic \xe9").unwrap();

    let mut statuses = Vec::new();
    for username in ["bob", "carol", "dave"] {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/register")
            .header("authorization", opaque.clone())
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "username": username, "secret": "pw1" }).to_string(),
            ))
            .unwrap();
        statuses.push(app.dispatch(request).await.status);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::CREATED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
}

#[tokio::test]
async fn test_non_ascii_header_on_protected_path() {
    let app = TestApp::new(config(10));
    let request = Request::builder()
        .uri("/api/orders")
        .header("authorization", HeaderValue::from_bytes(b"Basic \xe9").unwrap())
        .body(Body::empty())
        .unwrap();

    let reply = app.dispatch(request).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(&reply).error, "malformed credentials");

    app.register("bob", "pw1").await;
    let reply = app
        .send(Method::GET, "/api/orders", Some(&basic("bob", "pw1")), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-ratelimit-remaining"], "7");
}

#[tokio::test]
async fn test_header_without_scheme_prefix() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let bare = STANDARD.encode("bob:pw1");
    let reply = app.send(Method::GET, "/api/orders", Some(&bare), None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_scheme_case_sensitivity() {
    let lowercase = format!("basic {}", STANDARD.encode("bob:pw1"));

    let strict = TestApp::new(config(100));
    strict.register("bob", "pw1").await;
    let reply = strict
        .send(Method::GET, "/api/orders", Some(&lowercase), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let relaxed = TestApp::new(Config {
        auth_scheme_case_insensitive: true,
        ..config(100)
    });
    relaxed.register("bob", "pw1").await;
    let reply = relaxed
        .send(Method::GET, "/api/orders", Some(&lowercase), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_public_paths_skip_authentication() {
    let app = TestApp::new(config(100));

    let reply = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "healthy");
    assert_eq!(reply.body["counter_store_up"], true);

    let reply = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_registration_rejects_secrets_basic_cannot_carry() {
    let app = TestApp::new(config(10));

    let reply = app.register("bob", "pw1 ").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_body(&reply).error, "secret cannot end with whitespace");

    let reply = app.register(" bob", "pw1").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    // Nothing was stored, so the name is still free.
    assert_eq!(app.register("bob", "pw1").await.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_registration_with_password_alias() {
    let app = TestApp::new(config(100));

    let reply = app
        .send(
            Method::POST,
            "/register",
            None,
            Some(json!({ "username": "alice", "password": "pw" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = app
        .send(Method::GET, "/api/orders", Some(&basic("alice", "pw")), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn test_duplicate_order_is_conflict_and_keeps_first() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;
    let bob = basic("bob", "pw1");

    let reply = app
        .send(Method::POST, "/api/orders", Some(&bob), Some(order(7, "payload-a")))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = app
        .send(Method::POST, "/api/orders", Some(&bob), Some(order(7, "payload-b")))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let reply = app.send(Method::GET, "/api/orders/7", Some(&bob), None).await;
    assert_eq!(reply.body["customer"], "payload-a");
}

#[tokio::test]
async fn test_update_with_mismatched_id_leaves_order_unchanged() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;
    let bob = basic("bob", "pw1");

    app.send(Method::POST, "/api/orders", Some(&bob), Some(order(5, "original")))
        .await;

    let reply = app
        .send(Method::PUT, "/api/orders/5", Some(&bob), Some(order(6, "changed")))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(&reply).message,
        "trying to update a different order"
    );

    let reply = app.send(Method::GET, "/api/orders/5", Some(&bob), None).await;
    assert_eq!(reply.body["customer"], "original");
}

#[tokio::test]
async fn test_update_and_delete() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;
    let bob = basic("bob", "pw1");

    app.send(Method::POST, "/api/orders", Some(&bob), Some(order(3, "old")))
        .await;

    let reply = app
        .send(Method::PUT, "/api/orders/3", Some(&bob), Some(order(3, "new")))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["message"].is_string());

    let reply = app.send(Method::GET, "/api/orders/3", Some(&bob), None).await;
    assert_eq!(reply.body["customer"], "new");

    let reply = app
        .send(Method::DELETE, "/api/orders/3", Some(&bob), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app
        .send(Method::DELETE, "/api/orders/3", Some(&bob), None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_missing_order_is_not_found() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let reply = app
        .send(
            Method::PUT,
            "/api/orders/42",
            Some(&basic("bob", "pw1")),
            Some(order(42, "x")),
        )
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_envelope_is_ordered_by_id() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;
    let bob = basic("bob", "pw1");

    for id in [30, 10, 20] {
        app.send(Method::POST, "/api/orders", Some(&bob), Some(order(id, "c")))
            .await;
    }

    let reply = app.send(Method::GET, "/api/orders", Some(&bob), None).await;
    assert_eq!(reply.body["status"], 200);
    let ids: Vec<i64> = reply.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["order_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![10, 20, 30]);
}

#[tokio::test]
async fn test_invalid_order_is_bad_request() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let mut bad = order(1, "acme");
    bad["quantity"] = json!(0);

    let reply = app
        .send(Method::POST, "/api/orders", Some(&basic("bob", "pw1")), Some(bad))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Error bodies for framework-level failures
// =============================================================================

#[tokio::test]
async fn test_malformed_json_uses_error_body() {
    let app = TestApp::new(config(100));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.message, "invalid json body");
    assert_eq!(body.path, "/register");
    assert!(chrono::DateTime::parse_from_rfc3339(&body.timestamp).is_ok());
}

#[tokio::test]
async fn test_non_numeric_order_id_uses_error_body() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let reply = app
        .send(Method::GET, "/api/orders/abc", Some(&basic("bob", "pw1")), None)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_body(&reply).message, "invalid path parameter");
}

#[tokio::test]
async fn test_unknown_route_is_not_found_after_auth() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let reply = app.send(Method::GET, "/api/customers", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .send(Method::GET, "/api/customers", Some(&basic("bob", "pw1")), None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(error_body(&reply).path, "/api/customers");
}

#[tokio::test]
async fn test_wrong_method_uses_error_body() {
    let app = TestApp::new(config(100));
    app.register("bob", "pw1").await;

    let reply = app
        .send(Method::PATCH, "/api/orders/1", Some(&basic("bob", "pw1")), None)
        .await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(error_body(&reply).status, 405);
}

#[tokio::test]
async fn test_request_id_is_set() {
    let app = TestApp::new(config(100));
    let reply = app.send(Method::GET, "/health", None, None).await;
    assert!(reply.headers.contains_key("x-request-id"));
}
