//! Common error types for tollgate.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the gateway.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{IdError, RouteId};

    #[test]
    fn id_error_converts() {
        let err: CoreError = RouteId::new("").unwrap_err().into();
        assert!(matches!(err, CoreError::InvalidId(IdError::Empty)));
        assert_eq!(err.to_string(), "invalid identifier: identifier must not be empty");
    }
}
