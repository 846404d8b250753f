//! Gateway lifecycle: bind, serve, reload, stop.
//!
//! [`GatewayServer::start`] binds the application, WebSocket and admin
//! listeners and serves them in background tasks alongside the heartbeat
//! sweep. [`GatewayServer::stop`] cancels everything and waits, bounded by
//! `server.shutdown_timeout_seconds`, for those tasks to finish.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::error::GatewayError;
use crate::routes::{create_admin_router, create_app_router, create_ws_router};
use crate::state::{GatewayState, ReloadSummary};

/// Addresses the listeners actually bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    /// Application listener.
    pub http: SocketAddr,
    /// WebSocket listener.
    pub ws: SocketAddr,
    /// Admin listener.
    pub admin: SocketAddr,
}

/// A running (or runnable) gateway.
#[derive(Debug)]
pub struct GatewayServer {
    state: Arc<GatewayState>,
    bound: Mutex<Option<BoundAddrs>>,
}

impl GatewayServer {
    /// Wrap a state.
    #[must_use]
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self {
            state,
            bound: Mutex::new(None),
        }
    }

    /// Shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Addresses bound by `start`, if started.
    #[must_use]
    pub fn bound_addrs(&self) -> Option<BoundAddrs> {
        *self.bound.lock()
    }

    /// Bind all listeners and start serving.
    ///
    /// Returns once every listener is bound; serving continues in the
    /// background until [`GatewayServer::stop`].
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound or the server was
    /// already started.
    pub async fn start(&self) -> Result<BoundAddrs, GatewayError> {
        if self.bound.lock().is_some() {
            return Err(GatewayError::AlreadyStarted);
        }

        let server = self.state.config.current().server.clone();
        let http = bind(&server.http_addr).await?;
        let ws = bind(&server.ws_addr).await?;
        let admin = bind(&server.admin_addr).await?;

        let addrs = BoundAddrs {
            http: local_addr(&http, &server.http_addr)?,
            ws: local_addr(&ws, &server.ws_addr)?,
            admin: local_addr(&admin, &server.admin_addr)?,
        };

        self.serve("http", http, create_app_router(Arc::clone(&self.state)));
        self.serve("ws", ws, create_ws_router(Arc::clone(&self.state)));
        self.serve("admin", admin, create_admin_router(Arc::clone(&self.state)));

        let connections = Arc::clone(&self.state.connections);
        self.state
            .tracker()
            .spawn(async move { connections.run_heartbeat().await });

        *self.bound.lock() = Some(addrs);
        tracing::info!(
            http = %addrs.http,
            ws = %addrs.ws,
            admin = %addrs.admin,
            "Gateway started"
        );
        Ok(addrs)
    }

    fn serve(&self, surface: &'static str, listener: TcpListener, router: Router) {
        let shutdown = self.state.shutdown_token().clone();
        self.state.tracker().spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            match result {
                Ok(()) => tracing::info!(surface, "Listener stopped"),
                Err(err) => tracing::error!(surface, error = %err, "Listener failed"),
            }
        });
    }

    /// Stop serving.
    ///
    /// Cancels the listeners and every connection task, closes all WebSocket
    /// connections, waits for background tasks up to the shutdown timeout,
    /// then shuts down agent and tool instances.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ShutdownTimeout` if tasks were still running
    /// when the timeout expired. Services are shut down either way.
    pub async fn stop(&self) -> Result<(), GatewayError> {
        let timeout = self.state.config.current().server.shutdown_timeout();
        tracing::info!(?timeout, "Gateway stopping");

        self.state.shutdown_token().cancel();
        self.state.connections.close_all();

        let tracker = self.state.tracker();
        tracker.close();
        let drained = tokio::time::timeout(timeout, tracker.wait()).await.is_ok();

        if let Err(err) = self.state.hub.agents().close_all().await {
            tracing::warn!(error = %err, "Agent shutdown failed");
        }
        if let Err(err) = self.state.hub.tools().close_all().await {
            tracing::warn!(error = %err, "Tool service shutdown failed");
        }

        if drained {
            tracing::info!("Gateway stopped");
            Ok(())
        } else {
            tracing::warn!(?timeout, "Shutdown timed out with tasks still running");
            Err(GatewayError::ShutdownTimeout(timeout))
        }
    }

    /// Reload the whole configuration.
    ///
    /// Listener addresses are not rebound; they change only on restart.
    ///
    /// # Errors
    ///
    /// See `GatewayState::reload_config`.
    pub fn reload_config(&self) -> Result<ReloadSummary, GatewayError> {
        self.state.reload_config()
    }

    /// Reload only the proxy routes.
    ///
    /// # Errors
    ///
    /// See `GatewayState::reload_proxy_routes`.
    pub fn reload_proxy_routes(&self) -> Result<Vec<String>, GatewayError> {
        self.state.reload_proxy_routes()
    }

    /// Proxy paths currently installed.
    #[must_use]
    pub fn registered_proxy_routes(&self) -> Vec<String> {
        self.state.registered_proxy_routes()
    }
}

async fn bind(addr: &str) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })
}

fn local_addr(listener: &TcpListener, addr: &str) -> Result<SocketAddr, GatewayError> {
    listener.local_addr().map_err(|source| GatewayError::Bind {
        addr: addr.to_string(),
        source,
    })
}
