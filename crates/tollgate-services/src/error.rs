//! Service error types.

use thiserror::Error;

/// A result type using `ServiceError`.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by agent and tool services and their managers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service does not provide this operation.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),

    /// No factory is registered under this name.
    #[error("service not found: {0}")]
    FactoryNotFound(String),

    /// A factory is already registered under this name.
    #[error("service already registered: {0}")]
    FactoryExists(String),

    /// No live instance exists under this name.
    #[error("service instance not found: {0}")]
    InstanceNotFound(String),

    /// The service name was empty.
    #[error("service name must not be empty")]
    InvalidName,

    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A freshly created instance failed to initialize.
    #[error("failed to initialize {name}: {reason}")]
    Initialization {
        /// Service name.
        name: String,
        /// Failure description.
        reason: String,
    },

    /// The service failed while handling a request.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidName | Self::InvalidRequest(_) => 400,
            Self::FactoryNotFound(_) | Self::InstanceNotFound(_) => 404,
            Self::FactoryExists(_) => 409,
            Self::NotImplemented(_) => 501,
            Self::Initialization { .. } | Self::Upstream(_) | Self::Internal(_) => 500,
        }
    }

    /// Get the machine-readable reason code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotImplemented(_) => "not_implemented",
            Self::FactoryNotFound(_) | Self::InstanceNotFound(_) => "service_not_found",
            Self::FactoryExists(_) => "conflict",
            Self::InvalidName | Self::InvalidRequest(_) => "bad_request",
            Self::Initialization { .. } | Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether this error should count against the service's circuit breaker.
    ///
    /// Client mistakes and unknown names are not service failures.
    #[must_use]
    pub const fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::Initialization { .. } | Self::Upstream(_) | Self::Internal(_)
        )
    }
}
