//! In-process scenario tests for nx-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot`. The pool is lazy and points at nothing,
//! so only paths that never reach Postgres are exercised here; everything
//! DB-backed lives in the nx-db scenario tests.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use nx_config::{PortalConfig, ProviderConfig};
use nx_daemon::{routes, state};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> PortalConfig {
    PortalConfig {
        database_url: "postgres://nx:nx@127.0.0.1:1/nx_unreachable".to_string(),
        bind_addr: "127.0.0.1:8088".to_string(),
        session_ttl_hours: 24,
        provider: ProviderConfig {
            api_key: "apikey-test".to_string(),
            site_id: "site-test".to_string(),
            secret_key: "whsec-test".to_string(),
            base_url: "https://provider.invalid".to_string(),
            return_url: "https://portal.invalid/pay/ok".to_string(),
            cancel_url: "https://portal.invalid/pay/ko".to_string(),
            notify_url: "https://portal.invalid/v1/payments/webhook".to_string(),
        },
    }
}

/// Build a fresh in-process router. The pool connects lazily, so nothing
/// touches the network until a handler actually runs a query.
fn make_router() -> axum::Router {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    let st = Arc::new(state::AppState::new(pool, config));
    routes::build_router(st)
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_even_without_database() {
    let (status, body) = call(make_router(), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "nx-daemon");
    // The pool points nowhere, so the db probe must report false while the
    // process itself stays healthy.
    assert_eq!(json["db_ok"], false);
}

// ---------------------------------------------------------------------------
// Authentication gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    for uri in [
        "/v1/clients",
        "/v1/projects",
        "/v1/tasks",
        "/v1/documents",
        "/v1/quotes",
        "/v1/invoices",
        "/v1/payments",
        "/v1/tickets",
        "/v1/audit",
    ] {
        let (status, body) = call(make_router(), get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "expected 401 for {uri}");
        let json = parse_json(body);
        assert!(json["error"].is_string(), "error body for {uri}: {json}");
    }
}

#[tokio::test]
async fn malformed_authorization_header_is_401() {
    let req = Request::builder()
        .method("GET")
        .uri("/v1/clients")
        .header("authorization", "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Unknown routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let (status, _) = call(make_router(), get("/v1/does_not_exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payments_static_routes_coexist_with_id_route() {
    // /v1/payments/init and /v1/payments/check are static segments next to
    // /v1/payments/:id; the router must not shadow them. Both still sit
    // behind auth, so unauthenticated calls get 401, not 404/405.
    let init_req = Request::builder()
        .method("POST")
        .uri("/v1/payments/init")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"invoice_id":"00000000-0000-0000-0000-000000000000"}"#))
        .unwrap();
    let (status, _) = call(make_router(), init_req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(make_router(), get("/v1/payments/check?transaction_id=NX-x")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
