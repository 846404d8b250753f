//! Health and version endpoints of the application surface.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
}

/// Version response.
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check handler.
///
/// ```text
/// GET /api/v1/health
///
/// Response: 200 OK
/// {
///   "status": "ok",
///   "service": "tollgate"
/// }
/// ```
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok",
        service: crate::SERVICE_NAME,
    };

    (StatusCode::OK, Json(response))
}

/// Version handler.
pub async fn version() -> impl IntoResponse {
    Json(VersionResponse {
        service: crate::SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn version_returns_ok() {
        let response = version().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
