//! Request routing and admission control for tollgate.
//!
//! This crate holds the shared, lock-guarded state that every inbound
//! request consults before it is forwarded:
//!
//! - **Route table**: `(method, path)` keys mapped to weighted backend entries
//! - **Rate limiting**: continuous token buckets, one per key, created lazily
//! - **Circuit breaking**: a per-service closed/open/half-open state machine
//!
//! Nothing here performs I/O. All operations are synchronous and O(1) or
//! O(entries for one key), so they are safe to call from async handlers.
//!
//! # Example
//!
//! ```
//! use tollgate_core::RouteId;
//! use tollgate_routing::{CircuitBreaker, RateLimitManager, RouteEntry, RouteTable};
//!
//! let table = RouteTable::new();
//! table
//!     .add_route(RouteEntry::new(
//!         RouteId::new("search-v1").unwrap(),
//!         "GET",
//!         "/search",
//!         "search",
//!         "http://localhost:9000",
//!     ))
//!     .unwrap();
//!
//! let limits = RateLimitManager::new(100.0, 100);
//! let breaker = CircuitBreaker::default();
//!
//! let entry = table.match_route("GET", "/search").unwrap();
//! assert!(limits.allow(&entry.service_name));
//! assert!(breaker.allow_request(&entry.service_name));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod route_table;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState, ServiceSnapshot,
};
pub use error::{Result, RoutingError};
pub use rate_limit::{RateLimitManager, RateLimiter, RateLimiterSnapshot};
pub use route_table::{RouteEntry, RouteKey, RouteTable};
