//! Identifier types for tollgate.
//!
//! Route IDs are opaque strings chosen by whoever registers the route.
//! Connection IDs are generated by the gateway when a WebSocket upgrade succeeds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum accepted length for a route identifier.
pub const MAX_ROUTE_ID_LEN: usize = 128;

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty or whitespace.
    #[error("identifier must not be empty")]
    Empty,

    /// The identifier exceeded the maximum length.
    #[error("identifier too long: {len} > {max}")]
    TooLong {
        /// Actual length.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// The string was not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

/// Identity of a route entry.
///
/// Entries that share a `(method, path)` key must carry distinct IDs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteId(String);

impl RouteId {
    /// Create a route ID from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is empty or longer than [`MAX_ROUTE_ID_LEN`].
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if id.len() > MAX_ROUTE_ID_LEN {
            return Err(IdError::TooLong {
                len: id.len(),
                max: MAX_ROUTE_ID_LEN,
            });
        }
        Ok(Self(id))
    }

    /// Return the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteId({})", self.0)
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RouteId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RouteId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RouteId> for String {
    fn from(id: RouteId) -> Self {
        id.0
    }
}

/// A WebSocket connection identifier (UUID v4).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ConnectionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdError::InvalidUuid)
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_id_rejects_empty() {
        assert_eq!(RouteId::new(""), Err(IdError::Empty));
        assert_eq!(RouteId::new("   "), Err(IdError::Empty));
    }

    #[test]
    fn route_id_rejects_too_long() {
        let long = "r".repeat(MAX_ROUTE_ID_LEN + 1);
        assert!(matches!(
            RouteId::new(long),
            Err(IdError::TooLong { max: MAX_ROUTE_ID_LEN, .. })
        ));
    }

    #[test]
    fn route_id_serde_roundtrip() {
        let id = RouteId::new("canary-b").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"canary-b\"");
        let parsed: RouteId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn route_id_deserialize_rejects_empty() {
        let result: Result<RouteId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn connection_id_display_is_simple_uuid() {
        let id = ConnectionId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(!s.contains('-'));
        let parsed: ConnectionId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn connection_id_invalid() {
        assert_eq!("nope".parse::<ConnectionId>(), Err(IdError::InvalidUuid));
    }
}
