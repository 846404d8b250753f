//! API gateway with weighted routing, rate limiting, circuit breaking and
//! WebSocket fan-in.
//!
//! One process serves three surfaces from one shared [`GatewayState`]:
//!
//! - **application** (`server.http_addr`): agent and tool endpoints, plus a
//!   catch-all that forwards through the proxy table and the route table
//! - **websocket** (`server.ws_addr`): long-lived JSON message connections
//! - **admin** (`server.admin_addr`): status, hot reload and runtime tuning
//!
//! # Architecture
//!
//! ```text
//!        HTTP clients            WS clients            operators
//!             │                      │                     │
//!             ▼                      ▼                     ▼
//!  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//!  │  app router      │   │  ws router       │   │  admin router    │
//!  │  + dispatch      │   │  + conn manager  │   │  + reload        │
//!  └──────────────────┘   └──────────────────┘   └──────────────────┘
//!             │                      │                     │
//!             └──────────┬───────────┴─────────────────────┘
//!                        ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ GatewayState: config store, route table, proxy table,     │
//!   │ rate limiters, circuit breaker, agents, tool services     │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_gateway::{ConfigStore, GatewayConfig, GatewayServer, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ConfigStore::from_config(GatewayConfig::default()));
//! let state = GatewayState::new(store)?;
//! state.hub.register_examples().await?;
//!
//! let server = GatewayServer::new(state);
//! let addrs = server.start().await?;
//! println!("admin listening on {}", addrs.admin);
//!
//! tokio::signal::ctrl_c().await?;
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod ws;

pub use config::{ConfigError, ConfigOverrides, ConfigStore, GatewayConfig, LogFormat};
pub use error::{ApiError, GatewayError};
pub use routes::{create_admin_router, create_app_router, create_ws_router};
pub use server::{BoundAddrs, GatewayServer};
pub use state::{GatewayState, ReloadSummary};

/// Name reported by health and status endpoints.
pub const SERVICE_NAME: &str = "tollgate";
