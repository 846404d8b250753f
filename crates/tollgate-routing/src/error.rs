//! Routing error types.

use thiserror::Error;
use tollgate_core::RouteId;

/// A result type using `RoutingError`.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors raised by route table operations.
///
/// Rate limiters and circuit breakers never fail: their keys are created on
/// first reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The route entry is missing a required field or is malformed.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// An entry with the same ID already exists under the same key.
    #[error("duplicate route {id} for {method} {path}")]
    DuplicateRoute {
        /// The conflicting route ID.
        id: RouteId,
        /// Normalised method of the key.
        method: String,
        /// Path of the key.
        path: String,
    },

    /// No entry with the given ID exists.
    #[error("route not found: {0}")]
    RouteNotFound(RouteId),
}

impl RoutingError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidRoute(_) => 400,
            Self::DuplicateRoute { .. } => 409,
            Self::RouteNotFound(_) => 404,
        }
    }

    /// Get the machine-readable reason code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRoute(_) => "invalid_route",
            Self::DuplicateRoute { .. } => "duplicate_route",
            Self::RouteNotFound(_) => "route_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let id = RouteId::new("a").unwrap();
        assert_eq!(RoutingError::InvalidRoute("x".into()).http_status_code(), 400);
        assert_eq!(RoutingError::RouteNotFound(id.clone()).http_status_code(), 404);
        assert_eq!(
            RoutingError::DuplicateRoute {
                id,
                method: "GET".into(),
                path: "/x".into(),
            }
            .http_status_code(),
            409
        );
    }

    #[test]
    fn display_includes_key() {
        let err = RoutingError::DuplicateRoute {
            id: RouteId::new("b").unwrap(),
            method: "GET".into(),
            path: "/x".into(),
        };
        assert_eq!(err.to_string(), "duplicate route b for GET /x");
        assert_eq!(err.code(), "duplicate_route");
    }
}
