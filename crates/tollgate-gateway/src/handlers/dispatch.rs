//! Catch-all forwarding for the application surface.
//!
//! Requests that match no built-in endpoint are looked up in the proxy table
//! first, then in the route table. Either way the body is read, the call is
//! admitted by the rate limiter and circuit breaker, forwarded, and its
//! outcome recorded: a 5xx response or a transport error is a failure,
//! anything else a success. An unreadable or oversized body is refused with
//! 400 before admission. Requests that match nothing get a JSON 404.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};

use crate::admission::proxy_key;
use crate::error::ApiError;
use crate::proxy::{forward, read_body};
use crate::state::GatewayState;

/// Fallback handler.
pub async fn dispatch(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let path = request.uri().path().to_owned();

    if let Some(route) = state.proxy.resolve(&path) {
        let key = proxy_key(&route.path);
        return guarded_forward(&state, &key, &route.target, &HashMap::new(), request)
            .await
            .into_response();
    }

    let method = request.method().as_str().to_owned();
    if let Some(entry) = state.routes.match_route(&method, &path) {
        return guarded_forward(
            &state,
            &entry.service_name,
            &entry.backend_url,
            &entry.headers,
            request,
        )
        .await
        .into_response();
    }

    ApiError::NotFound(format!("no route for {method} {path}")).into_response()
}

async fn guarded_forward(
    state: &GatewayState,
    key: &str,
    target: &str,
    headers: &HashMap<String, String>,
    request: Request,
) -> Result<Response, ApiError> {
    let max_body = state.config.current().server.max_body_bytes;
    let request = read_body(request, max_body)
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    state.admission.admit(key)?;

    match forward(state.http_client(), target, headers, request).await {
        Ok(response) => {
            state
                .admission
                .record(key, !response.status().is_server_error());
            Ok(response)
        }
        Err(err) => {
            tracing::warn!(key = %key, target = %target, error = %err, "Proxy request failed");
            state.admission.record(key, false);
            Err(ApiError::BadGateway("Proxy request failed".into()))
        }
    }
}
