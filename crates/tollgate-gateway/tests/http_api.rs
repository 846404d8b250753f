//! Application surface tests.
//!
//! Each test builds a gateway state from an in-memory configuration, mounts
//! the application router on an `axum-test` server and points forwarding
//! targets at `wiremock` backends.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tollgate_gateway::config::ProxyRouteConfig;
use tollgate_gateway::{create_app_router, ConfigStore, GatewayConfig, GatewayState};
use tollgate_routing::RouteEntry;

// =============================================================================
// Helpers
// =============================================================================

async fn app(config: GatewayConfig) -> (TestServer, Arc<GatewayState>) {
    let state = GatewayState::new(Arc::new(ConfigStore::from_config(config))).unwrap();
    state.hub.register_examples().await.unwrap();
    let server = TestServer::new(create_app_router(Arc::clone(&state))).unwrap();
    (server, state)
}

fn route(id: &str, method: &str, path: &str, service: &str, backend: &str) -> RouteEntry {
    RouteEntry::new(id.parse().unwrap(), method, path, service, backend)
}

fn proxy(path: &str, target: &str) -> ProxyRouteConfig {
    ProxyRouteConfig {
        path: path.into(),
        target_url: target.into(),
        enable: true,
    }
}

// =============================================================================
// Built-in endpoints
// =============================================================================

#[tokio::test]
async fn health_and_version() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let response = server.get("/api/v1/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "tollgate");

    let body: Value = server.get("/api/v1/version").await.json();
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn chat_with_default_agent() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let response = server
        .post("/api/v1/ai-agent/chat")
        .json(&json!({
            "model": "example-small",
            "messages": [{"role": "user", "content": "how are you"}]
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("how are you"));
}

#[tokio::test]
async fn chat_with_unknown_agent_is_404() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let response = server
        .post("/api/v1/ai-agent/chat")
        .json(&json!({
            "agent_id": "ghost",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn malformed_chat_body_is_400() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let response = server
        .post("/api/v1/ai-agent/chat")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn models_lists_agents() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let body: Value = server.get("/api/v1/ai-agent/models").await.json();
    assert_eq!(body["agent_id"], "example-agent");
    assert!(body["agents"]
        .as_array()
        .unwrap()
        .contains(&json!("example-agent")));
    assert!(!body["models"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn tool_command_runs_calculate() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let response = server
        .post("/api/v1/mcp/command")
        .json(&json!({
            "command": "calculate",
            "parameters": {"operation": "add", "a": 2, "b": 3}
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["result"], 5.0);
}

#[tokio::test]
async fn tool_failure_is_a_200_with_success_false() {
    let (server, state) = app(GatewayConfig::default()).await;

    let response = server
        .post("/api/v1/mcp/command")
        .json(&json!({
            "command": "calculate",
            "parameters": {"operation": "divide", "a": 1, "b": 0}
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(
        state.breaker.state("tool:example-tools"),
        tollgate_routing::CircuitState::Closed
    );
}

#[tokio::test]
async fn tool_services_listed() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let body: Value = server.get("/api/v1/mcp/services").await.json();
    assert!(body["services"]
        .as_array()
        .unwrap()
        .contains(&json!("example-tools")));
}

// =============================================================================
// Forwarding
// =============================================================================

#[tokio::test]
async fn unmatched_path_is_json_404() {
    let (server, _state) = app(GatewayConfig::default()).await;

    let response = server.get("/nowhere").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn route_table_forwards_with_header_overrides() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .and(header("x-tollgate", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2]})))
        .expect(1)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config.routes.push(
        route("items-1", "GET", "/items", "items", &backend.uri()).with_header("X-Tollgate", "yes"),
    );
    let (server, _state) = app(config).await;

    let response = server.get("/items").add_query_param("page", 2).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({"items": [1, 2]}));
}

#[tokio::test]
async fn route_table_method_mismatch_is_404() {
    let backend = MockServer::start().await;
    let mut config = GatewayConfig::default();
    config
        .routes
        .push(route("items-1", "GET", "/items", "items", &backend.uri()));
    let (server, _state) = app(config).await;

    server
        .delete("/items")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proxy_route_passes_body_and_status() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(body_string("payload"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-backend", "search")
                .set_body_string("created"),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config.proxy_routes.push(proxy("/search", &backend.uri()));
    let (server, _state) = app(config).await;

    let response = server
        .post("/search")
        .add_query_param("q", "rust")
        .text("payload")
        .await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.header("x-backend"), "search");
    assert_eq!(response.text(), "created");
}

#[tokio::test]
async fn prefix_proxy_route_keeps_the_request_path() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/intro"))
        .respond_with(ResponseTemplate::new(200).set_body_string("intro"))
        .expect(1)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config.proxy_routes.push(proxy("/docs/*", &backend.uri()));
    let (server, _state) = app(config).await;

    let response = server.get("/docs/intro").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "intro");
}

#[tokio::test]
async fn proxy_wins_over_route_table() {
    let proxied = MockServer::start().await;
    Mock::given(path("/shared"))
        .respond_with(ResponseTemplate::new(200).set_body_string("proxy"))
        .expect(1)
        .mount(&proxied)
        .await;
    let routed = MockServer::start().await;
    Mock::given(path("/shared"))
        .respond_with(ResponseTemplate::new(200).set_body_string("route"))
        .expect(0)
        .mount(&routed)
        .await;

    let mut config = GatewayConfig::default();
    config.proxy_routes.push(proxy("/shared", &proxied.uri()));
    config
        .routes
        .push(route("shared-1", "GET", "/shared", "shared", &routed.uri()));
    let (server, _state) = app(config).await;

    assert_eq!(server.get("/shared").await.text(), "proxy");
}

#[tokio::test]
async fn unreachable_target_is_502() {
    let mut config = GatewayConfig::default();
    config.proxy_routes.push(proxy("/down", "http://127.0.0.1:1"));
    let (server, state) = app(config).await;

    let response = server.get("/down").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_gateway");
    assert_eq!(body["error"]["message"], "Proxy request failed");

    let snapshot = state.breaker.snapshot();
    assert_eq!(snapshot.services["proxy:/down"].error_count, 1);
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn exhausted_limiter_is_429() {
    let backend = MockServer::start().await;
    Mock::given(path("/items"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config
        .routes
        .push(route("items-1", "GET", "/items", "items", &backend.uri()));
    let (server, state) = app(config).await;
    state.rate_limits.update_rate_limiter("items", 0.0, 1);

    server.get("/items").await.assert_status_ok();

    let response = server.get("/items").await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn oversized_body_is_refused_before_admission() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config
        .routes
        .push(route("items-1", "POST", "/items", "items", &backend.uri()));
    let (server, state) = app(config).await;
    state.rate_limits.update_rate_limiter("items", 0.0, 1);
    state.config.update(|config| config.server.max_body_bytes = 4);

    let response = server.post("/items").text("far too large").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");

    // The refused request neither spent the only token nor touched the breaker.
    assert!(!state.breaker.snapshot().services.contains_key("items"));
    server.post("/items").text("ok").await.assert_status_ok();
}

#[tokio::test]
async fn disabled_rate_limiting_admits_everything() {
    let backend = MockServer::start().await;
    Mock::given(path("/items"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config.router.enable_rate_limit = false;
    config
        .routes
        .push(route("items-1", "GET", "/items", "items", &backend.uri()));
    let (server, state) = app(config).await;
    state.rate_limits.update_rate_limiter("items", 0.0, 1);

    for _ in 0..3 {
        server.get("/items").await.assert_status_ok();
    }
}

#[tokio::test]
async fn backend_errors_open_the_circuit() {
    let backend = MockServer::start().await;
    Mock::given(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config.router.circuit_break_threshold = 2;
    config
        .routes
        .push(route("flaky-1", "GET", "/flaky", "flaky", &backend.uri()));
    let (server, _state) = app(config).await;

    server
        .get("/flaky")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    server
        .get("/flaky")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let response = server.get("/flaky").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "circuit_open");
}

#[tokio::test]
async fn open_circuit_is_ignored_when_breaking_is_off() {
    let backend = MockServer::start().await;
    Mock::given(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&backend)
        .await;

    let mut config = GatewayConfig::default();
    config.router.circuit_break = false;
    config.router.circuit_break_threshold = 1;
    config
        .routes
        .push(route("flaky-1", "GET", "/flaky", "flaky", &backend.uri()));
    let (server, _state) = app(config).await;

    for _ in 0..3 {
        server
            .get("/flaky")
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}
