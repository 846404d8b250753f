//! HTTP client for the admin surface.
//!
//! This module provides a typed client over the gateway's admin listener.

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;

use crate::types::{
    ApiErrorResponse, Breakers, Limiters, Message, ProxyReload, Reload, Routes, Status,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error envelope.
    #[error("API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Client for the admin REST API.
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: Client,
    base_url: String,
}

impl AdminClient {
    /// Create a client for the admin listener at `base_url`
    /// (e.g. "http://localhost:8082").
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%method, %url, "Admin request");

        let response = self.client.request(method, &url).send().await?;
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Turn a non-2xx response into [`ClientError::Api`].
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        match response.json::<ApiErrorResponse>().await {
            Ok(body) => ClientError::Api {
                status,
                code: body.error.code,
                message: body.error.message,
            },
            Err(_) => ClientError::Api {
                status,
                code: "unknown".into(),
                message: "Unknown error".into(),
            },
        }
    }

    // =========================================================================
    // Status and reload
    // =========================================================================

    /// Gateway status.
    pub async fn status(&self) -> Result<Status, ClientError> {
        self.request(Method::GET, "/status").await
    }

    /// Reload the whole configuration file.
    pub async fn reload_config(&self) -> Result<Reload, ClientError> {
        self.request(Method::POST, "/reload-config").await
    }

    /// Reload only the proxy routes.
    pub async fn reload_proxy_routes(&self) -> Result<ProxyReload, ClientError> {
        self.request(Method::POST, "/reload-proxy-routes").await
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Route table entries.
    pub async fn routes(&self) -> Result<Routes, ClientError> {
        self.request(Method::GET, "/routes").await
    }

    /// Breaker thresholds and per-service states.
    pub async fn circuit_breakers(&self) -> Result<Breakers, ClientError> {
        self.request(Method::GET, "/circuit-breakers").await
    }

    /// Close one service's circuit, or all of them when `service` is `None`.
    pub async fn reset_breaker(&self, service: Option<&str>) -> Result<Message, ClientError> {
        let path = match service {
            Some(service) => format!("/circuit-breakers/{service}/reset"),
            None => "/circuit-breakers/reset".to_string(),
        };
        self.request(Method::POST, &path).await
    }

    /// Limiter defaults and every limiter.
    pub async fn rate_limiters(&self) -> Result<Limiters, ClientError> {
        self.request(Method::GET, "/rate-limiters").await
    }
}
