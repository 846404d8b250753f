//! Admin surface tests.

use std::future::IntoFuture;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use tollgate_gateway::{create_admin_router, ConfigOverrides, ConfigStore, GatewayConfig, GatewayState};
use tollgate_routing::CircuitState;

const CONFIG: &str = r#"
server:
  debug: false
routes:
  - id: items-1
    method: GET
    path: /items
    service_name: items
    backend_url: http://localhost:9100
proxy_routes:
  - path: /search
    target_url: http://localhost:8302
"#;

async fn admin(config: GatewayConfig) -> (TestServer, Arc<GatewayState>) {
    let state = GatewayState::new(Arc::new(ConfigStore::from_config(config))).unwrap();
    state.hub.register_examples().await.unwrap();
    let server = TestServer::new(create_admin_router(Arc::clone(&state))).unwrap();
    (server, state)
}

async fn admin_from_file(yaml: &str) -> (NamedTempFile, TestServer, Arc<GatewayState>) {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), yaml).unwrap();
    let store = ConfigStore::load(Some(file.path().to_path_buf()), ConfigOverrides::default()).unwrap();
    let state = GatewayState::new(Arc::new(store)).unwrap();
    state.hub.register_examples().await.unwrap();
    let server = TestServer::new(create_admin_router(Arc::clone(&state))).unwrap();
    (file, server, state)
}

fn entry(id: &str, path: &str) -> Value {
    json!({
        "id": id,
        "method": "GET",
        "path": path,
        "service_name": "svc",
        "backend_url": "http://localhost:9000"
    })
}

// =============================================================================
// Status and config
// =============================================================================

#[tokio::test]
async fn status_reports_components() {
    let (_file, server, _state) = admin_from_file(CONFIG).await;

    let response = server.get("/status").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["service"], "tollgate");
    assert_eq!(body["status"], "running");
    assert_eq!(body["routes"], 1);
    assert_eq!(body["connections"], 0);
    assert_eq!(body["proxy_routes"], json!(["/search"]));
    assert_eq!(body["ai_agents"], json!(["example-agent"]));
    assert_eq!(body["mcp_services"], json!(["example-tools"]));
}

#[tokio::test]
async fn config_hidden_outside_debug() {
    let (server, _state) = admin(GatewayConfig::default()).await;
    server
        .get("/config")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let mut config = GatewayConfig::default();
    config.server.debug = true;
    let (server, _state) = admin(config).await;
    let body: Value = server.get("/config").await.json();
    assert_eq!(body["server"]["debug"], true);
}

#[tokio::test]
async fn unknown_admin_path_is_json_404() {
    let (server, _state) = admin(GatewayConfig::default()).await;
    let response = server.get("/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

// =============================================================================
// Reload
// =============================================================================

#[tokio::test]
async fn reload_config_applies_file() {
    let (file, server, state) = admin_from_file(CONFIG).await;
    std::fs::write(
        file.path(),
        r#"
routes:
  - id: a
    method: GET
    path: /a
    service_name: a
    backend_url: http://localhost:9001
  - id: b
    method: POST
    path: /b
    service_name: b
    backend_url: http://localhost:9002
proxy_routes:
  - path: /maps/*
    target_url: http://localhost:8303
"#,
    )
    .unwrap();

    let response = server.post("/reload-config").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["routes"], 2);
    assert_eq!(body["proxy_routes"], json!(["/maps/*"]));
    assert!(state.routes.match_route("GET", "/items").is_none());
}

#[tokio::test]
async fn broken_file_keeps_previous_config() {
    let (file, server, state) = admin_from_file(CONFIG).await;
    std::fs::write(file.path(), "routes: [ {").unwrap();

    let response = server.post("/reload-config").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.routes.match_route("GET", "/items").is_some());
    assert_eq!(state.registered_proxy_routes(), vec!["/search"]);
}

#[tokio::test]
async fn reload_proxy_routes_only() {
    let (file, server, state) = admin_from_file(CONFIG).await;
    std::fs::write(
        file.path(),
        r#"
proxy_routes:
  - path: /search
    target_url: http://localhost:8302
  - path: /weather
    target_url: http://localhost:8304
"#,
    )
    .unwrap();

    let response = server.post("/reload-proxy-routes").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["proxy_routes"], json!(["/search", "/weather"]));
    assert_eq!(state.routes.len(), 1);
}

#[tokio::test]
async fn concurrent_reloads_both_complete() {
    let (_file, server, state) = admin_from_file(CONFIG).await;

    let (full, proxies) = tokio::join!(
        server.post("/reload-config").into_future(),
        server.post("/reload-proxy-routes").into_future(),
    );
    full.assert_status_ok();
    proxies.assert_status_ok();
    assert_eq!(state.registered_proxy_routes(), vec!["/search"]);
    assert_eq!(state.routes.len(), 1);
}

// =============================================================================
// Routes
// =============================================================================

#[tokio::test]
async fn route_crud() {
    let (server, state) = admin(GatewayConfig::default()).await;

    server
        .post("/routes")
        .json(&entry("r1", "/orders"))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/routes")
        .json(&entry("r1", "/orders"))
        .await
        .assert_status(StatusCode::CONFLICT);

    let body: Value = server.get("/routes").await.json();
    assert_eq!(body["routes"].as_array().unwrap().len(), 1);

    let mut updated = entry("ignored", "/orders");
    updated["backend_url"] = json!("http://localhost:9999");
    let response = server.put("/routes/r1").json(&updated).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], "r1");
    assert_eq!(
        state.routes.match_route("GET", "/orders").unwrap().backend_url,
        "http://localhost:9999"
    );

    server
        .put("/routes/ghost")
        .json(&entry("ghost", "/x"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    server.delete("/routes/r1").await.assert_status_ok();
    server
        .delete("/routes/r1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert!(state.routes.is_empty());
}

#[tokio::test]
async fn invalid_route_is_400() {
    let (server, _state) = admin(GatewayConfig::default()).await;
    let response = server.post("/routes").json(&entry("r1", "no-slash")).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

// =============================================================================
// Circuit breakers and rate limiters
// =============================================================================

#[tokio::test]
async fn breaker_inspection_and_reset() {
    let mut config = GatewayConfig::default();
    config.router.circuit_break_threshold = 1;
    let (server, state) = admin(config).await;
    state.breaker.record_failure("a");
    state.breaker.record_failure("b");

    let body: Value = server.get("/circuit-breakers").await.json();
    assert_eq!(body["error_threshold"], 1);
    assert_eq!(body["services"]["a"]["state"], "open");

    server
        .post("/circuit-breakers/a/reset")
        .await
        .assert_status_ok();
    assert_eq!(state.breaker.state("a"), CircuitState::Closed);
    assert_eq!(state.breaker.state("b"), CircuitState::Open);

    server.post("/circuit-breakers/reset").await.assert_status_ok();
    assert_eq!(state.breaker.state("b"), CircuitState::Closed);
}

#[tokio::test]
async fn limiter_update_and_listing() {
    let (server, state) = admin(GatewayConfig::default()).await;

    let response = server
        .put("/rate-limiters/items")
        .json(&json!({"rate": 2.5, "burst": 5, "enabled": false}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["rate"], 2.5);
    assert_eq!(body["burst"], 5);
    assert_eq!(body["enabled"], false);
    assert!(!state.rate_limits.get_rate_limiter("items").is_enabled());

    let body: Value = server.get("/rate-limiters").await.json();
    assert_eq!(body["default_rate"], 100.0);
    assert_eq!(body["limiters"]["items"]["burst"], 5);

    server
        .put("/rate-limiters/items")
        .json(&json!({"rate": -1.0, "burst": 5}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
