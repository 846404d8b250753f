//! API and lifecycle error types.
//!
//! [`ApiError`] is the uniform error body for every HTTP surface:
//! `{"error": {"code": "...", "message": "..."}}`. [`GatewayError`] covers
//! startup, reload and shutdown.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use tollgate_routing::RoutingError;
use tollgate_services::ServiceError;

use crate::config::ConfigError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's rate limit is exhausted.
    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    /// The target service's circuit is open.
    #[error("service {0} is unavailable: circuit open")]
    CircuitOpen(String),

    /// The gateway cannot take more work of this kind.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// A backend could not be reached.
    #[error("{0}")]
    BadGateway(String),

    /// The operation is not supported by the target service.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A backend service failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen(_) | Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::CircuitOpen(_) => "circuit_open",
            Self::Unavailable(_) => "unavailable",
            Self::BadGateway(_) => "bad_gateway",
            Self::NotImplemented(_) => "not_implemented",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RoutingError> for ApiError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::InvalidRoute(msg) => Self::BadRequest(msg),
            RoutingError::DuplicateRoute { .. } => Self::Conflict(err.to_string()),
            RoutingError::RouteNotFound(id) => Self::NotFound(format!("route {id}")),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidName | ServiceError::InvalidRequest(_) => {
                Self::BadRequest(err.to_string())
            }
            ServiceError::FactoryNotFound(name) | ServiceError::InstanceNotFound(name) => {
                Self::NotFound(format!("service {name}"))
            }
            ServiceError::FactoryExists(name) => Self::Conflict(format!("service {name} already registered")),
            ServiceError::NotImplemented(op) => Self::NotImplemented(op.to_string()),
            ServiceError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Service upstream error");
                Self::Upstream(msg)
            }
            ServiceError::Initialization { .. } | ServiceError::Internal(_) => {
                tracing::error!(error = %err, "Service error");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "Configuration error");
        Self::Internal(format!("failed to load configuration: {err}"))
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Config(err) => Self::from(err),
            GatewayError::Routes(err) => Self::from(err),
            other => {
                tracing::error!(error = %other, "Gateway error");
                Self::Internal(other.to_string())
            }
        }
    }
}

/// Errors from gateway startup, reload and shutdown.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configured routes were rejected by the route table.
    #[error("invalid route configuration: {0}")]
    Routes(#[from] RoutingError),

    /// The outbound HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Shutdown did not finish in time.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// The server was started twice.
    #[error("server already started")]
    AlreadyStarted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::RouteId;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::RateLimited("k".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::CircuitOpen("svc".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::BadGateway("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::NotImplemented("embedding".into()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn routing_errors_map() {
        let id = RouteId::new("r1").unwrap();
        let err = ApiError::from(RoutingError::RouteNotFound(id));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ApiError::from(RoutingError::InvalidRoute("empty path".into()));
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn service_errors_map() {
        let err = ApiError::from(ServiceError::FactoryNotFound("ghost".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ApiError::from(ServiceError::NotImplemented("embedding"));
        assert_eq!(err.code(), "not_implemented");

        let err = ApiError::from(ServiceError::Upstream("timeout".into()));
        assert_eq!(err.code(), "upstream_error");
    }

    #[tokio::test]
    async fn error_body_shape() {
        let response = ApiError::BadGateway("Proxy request failed".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "bad_gateway");
        assert_eq!(body["error"]["message"], "Proxy request failed");
    }
}
