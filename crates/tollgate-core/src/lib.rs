//! Core types and utilities for tollgate.
//!
//! This crate provides the foundational types shared by the gateway crates:
//!
//! - **Identifiers**: Strongly-typed IDs for route entries and WebSocket connections
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use tollgate_core::{ConnectionId, RouteId};
//!
//! // Route IDs are caller-chosen opaque strings
//! let route_id = RouteId::new("search-canary").unwrap();
//! assert_eq!(route_id.as_str(), "search-canary");
//!
//! // Connection IDs are generated on upgrade
//! let conn_id = ConnectionId::generate();
//! assert_ne!(conn_id, ConnectionId::generate());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{ConnectionId, IdError, RouteId};
