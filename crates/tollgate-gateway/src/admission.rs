//! Request admission: rate limiting then circuit breaking.
//!
//! Every forwarded call goes through [`Admission::admit`] before it touches a
//! backend and reports its outcome with [`Admission::record`] afterwards.
//! Rejected calls never reach the backend and are not recorded.

use std::future::Future;
use std::sync::Arc;

use tollgate_routing::{CircuitBreaker, RateLimitManager};

use crate::config::ConfigStore;
use crate::error::ApiError;

/// Why a call was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The key's token bucket is empty.
    RateLimited(String),
    /// The key's circuit is open.
    CircuitOpen(String),
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::RateLimited(key) => Self::RateLimited(key),
            Rejection::CircuitOpen(key) => Self::CircuitOpen(key),
        }
    }
}

/// Rate limiter and circuit breaker applied as one gate.
#[derive(Debug, Clone)]
pub struct Admission {
    config: Arc<ConfigStore>,
    limits: Arc<RateLimitManager>,
    breaker: Arc<CircuitBreaker>,
}

impl Admission {
    /// Create a gate over shared limiter and breaker state.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        limits: Arc<RateLimitManager>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            limits,
            breaker,
        }
    }

    /// The rate limiters behind this gate.
    #[must_use]
    pub fn limits(&self) -> &Arc<RateLimitManager> {
        &self.limits
    }

    /// The circuit breaker behind this gate.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Decide whether a call for `key` may proceed.
    ///
    /// The limiter is consulted only when `router.enable_rate_limit` is set
    /// in the current configuration.
    ///
    /// # Errors
    ///
    /// Returns the reason the call was refused.
    pub fn admit(&self, key: &str) -> Result<(), Rejection> {
        if self.config.current().router.enable_rate_limit && !self.limits.allow(key) {
            tracing::debug!(key = %key, "Rate limit exceeded");
            return Err(Rejection::RateLimited(key.to_string()));
        }
        if !self.breaker.allow_request(key) {
            tracing::debug!(key = %key, "Circuit open");
            return Err(Rejection::CircuitOpen(key.to_string()));
        }
        Ok(())
    }

    /// Report the outcome of an admitted call.
    pub fn record(&self, key: &str, success: bool) {
        if success {
            self.breaker.record_success(key);
        } else {
            self.breaker.record_failure(key);
        }
    }

    /// Admit, run `call`, and record the outcome.
    ///
    /// Only service failures (see `ServiceError::is_service_failure`) count
    /// against the breaker; caller mistakes such as an invalid request do not.
    ///
    /// # Errors
    ///
    /// Returns the rejection or the call's error converted to an `ApiError`.
    pub async fn guard<T, F>(&self, key: &str, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = tollgate_services::Result<T>>,
    {
        self.admit(key)?;
        match call.await {
            Ok(value) => {
                self.record(key, true);
                Ok(value)
            }
            Err(err) => {
                self.record(key, !err.is_service_failure());
                Err(err.into())
            }
        }
    }
}

/// Limiter and breaker key for an agent.
#[must_use]
pub fn agent_key(name: &str) -> String {
    format!("agent:{name}")
}

/// Limiter and breaker key for a tool service.
#[must_use]
pub fn tool_key(name: &str) -> String {
    format!("tool:{name}")
}

/// Limiter and breaker key for a proxied path.
#[must_use]
pub fn proxy_key(path: &str) -> String {
    format!("proxy:{path}")
}
