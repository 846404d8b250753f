//! Per-service circuit breaker.
//!
//! Each service name has its own closed/open/half-open record, created as
//! closed on first reference. Callers ask [`CircuitBreaker::allow_request`]
//! before forwarding and report the outcome with
//! [`CircuitBreaker::record_success`] or [`CircuitBreaker::record_failure`];
//! the breaker never observes requests itself.
//!
//! ```text
//!            errors >= error_threshold
//!   Closed ───────────────────────────▶ Open
//!     ▲                                  │  next request after `timeout`
//!     │ successes >= success_threshold   ▼
//!     └──────────────────────────── HalfOpen ──(any failure)──▶ Open
//! ```
//!
//! The open to half-open move happens only when a request asks for
//! admission; there is no background timer.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Breaker state for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow; failures are counted.
    Closed,
    /// Requests are rejected until the timeout elapses.
    Open,
    /// Trial state; requests flow and the first failure reopens.
    HalfOpen,
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Errors in closed state that open the circuit.
    pub error_threshold: u32,
    /// Successes in half-open state that close the circuit.
    pub success_threshold: u32,
    /// Time an open circuit waits before admitting a trial request.
    pub timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Default error threshold.
    pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;
    /// Default success threshold.
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
    /// Default open timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold: Self::DEFAULT_ERROR_THRESHOLD,
            success_threshold: Self::DEFAULT_SUCCESS_THRESHOLD,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ServiceRecord {
    state: CircuitState,
    error_count: u32,
    success_count: u32,
    last_state_change: Instant,
}

impl ServiceRecord {
    const fn closed(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            error_count: 0,
            success_count: 0,
            last_state_change: now,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.last_state_change = now;
        if to != CircuitState::Open {
            self.error_count = 0;
            self.success_count = 0;
        }
    }
}

/// Per-service view in a [`CircuitBreakerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Errors counted since the last reset.
    pub error_count: u32,
    /// Successes counted in half-open state.
    pub success_count: u32,
    /// Milliseconds since the last state change.
    pub since_state_change_ms: u64,
}

/// Point-in-time view of the whole breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    /// Errors that open a circuit.
    pub error_threshold: u32,
    /// Successes that close a half-open circuit.
    pub success_threshold: u32,
    /// Open timeout in milliseconds.
    pub timeout_ms: u64,
    /// When true every request is admitted regardless of state.
    pub fallback_disabled: bool,
    /// Per-service records, ordered by name.
    pub services: BTreeMap<String, ServiceSnapshot>,
}

/// Circuit breaker shared by the gateway, keyed by service name.
#[derive(Debug)]
pub struct CircuitBreaker {
    services: RwLock<HashMap<String, ServiceRecord>>,
    config: RwLock<CircuitBreakerConfig>,
    fallback_disabled: AtomicBool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Create a breaker with the given thresholds.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            config: RwLock::new(normalize(config)),
            fallback_disabled: AtomicBool::new(false),
        }
    }

    /// Decide whether a request for `service` may proceed.
    #[must_use]
    pub fn allow_request(&self, service: &str) -> bool {
        self.allow_request_at(service, Instant::now())
    }

    /// Same as [`CircuitBreaker::allow_request`] at an explicit instant.
    #[must_use]
    pub fn allow_request_at(&self, service: &str, now: Instant) -> bool {
        if self.fallback_disabled.load(Ordering::Relaxed) {
            return true;
        }
        let timeout = self.config.read().timeout;

        match self.services.read().get(service) {
            Some(record) if record.state != CircuitState::Open => return true,
            Some(record) if now.saturating_duration_since(record.last_state_change) <= timeout => {
                return false;
            }
            _ => {}
        }

        let mut services = self.services.write();
        let record = services
            .entry(service.to_string())
            .or_insert_with(|| ServiceRecord::closed(now));

        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if now.saturating_duration_since(record.last_state_change) > timeout {
                    record.transition(CircuitState::HalfOpen, now);
                    tracing::info!(service = %service, "Circuit half-open, admitting trial request");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful request for `service`.
    pub fn record_success(&self, service: &str) {
        self.record_success_at(service, Instant::now());
    }

    /// Same as [`CircuitBreaker::record_success`] at an explicit instant.
    pub fn record_success_at(&self, service: &str, now: Instant) {
        let success_threshold = self.config.read().success_threshold;
        let mut services = self.services.write();
        let record = services
            .entry(service.to_string())
            .or_insert_with(|| ServiceRecord::closed(now));

        match record.state {
            CircuitState::Closed => record.error_count = 0,
            CircuitState::HalfOpen => {
                record.success_count += 1;
                if record.success_count >= success_threshold {
                    record.transition(CircuitState::Closed, now);
                    tracing::info!(service = %service, "Circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Report a failed request for `service`.
    ///
    /// Failures reported while the circuit is already open are ignored; the
    /// open period is not extended.
    pub fn record_failure(&self, service: &str) {
        self.record_failure_at(service, Instant::now());
    }

    /// Same as [`CircuitBreaker::record_failure`] at an explicit instant.
    pub fn record_failure_at(&self, service: &str, now: Instant) {
        let error_threshold = self.config.read().error_threshold;
        let mut services = self.services.write();
        let record = services
            .entry(service.to_string())
            .or_insert_with(|| ServiceRecord::closed(now));

        match record.state {
            CircuitState::Closed => {
                record.error_count += 1;
                if record.error_count >= error_threshold {
                    record.transition(CircuitState::Open, now);
                    tracing::warn!(
                        service = %service,
                        errors = record.error_count,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                record.error_count += 1;
                record.success_count = 0;
                record.transition(CircuitState::Open, now);
                tracing::warn!(service = %service, "Trial request failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state of `service`. Unknown services are closed.
    #[must_use]
    pub fn state(&self, service: &str) -> CircuitState {
        self.services
            .read()
            .get(service)
            .map_or(CircuitState::Closed, |record| record.state)
    }

    /// Force `service` back to closed with cleared counts.
    pub fn reset_service(&self, service: &str) {
        let now = Instant::now();
        self.services
            .write()
            .insert(service.to_string(), ServiceRecord::closed(now));
        tracing::info!(service = %service, "Circuit reset");
    }

    /// Force every known service back to closed.
    pub fn reset_all(&self) {
        let now = Instant::now();
        let mut services = self.services.write();
        for record in services.values_mut() {
            *record = ServiceRecord::closed(now);
        }
        tracing::info!(services = services.len(), "All circuits reset");
    }

    /// Kill switch: admit every request regardless of circuit state.
    pub fn disable_fallback(&self) {
        self.fallback_disabled.store(true, Ordering::Relaxed);
        tracing::warn!("Circuit breaker bypassed");
    }

    /// Undo [`CircuitBreaker::disable_fallback`].
    pub fn enable_fallback(&self) {
        self.fallback_disabled.store(false, Ordering::Relaxed);
    }

    /// Whether the kill switch is engaged.
    #[must_use]
    pub fn is_fallback_disabled(&self) -> bool {
        self.fallback_disabled.load(Ordering::Relaxed)
    }

    /// Change the error threshold (minimum 1).
    pub fn set_error_threshold(&self, threshold: u32) {
        self.config.write().error_threshold = threshold.max(1);
    }

    /// Change the success threshold (minimum 1).
    pub fn set_success_threshold(&self, threshold: u32) {
        self.config.write().success_threshold = threshold.max(1);
    }

    /// Change the open timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        self.config.write().timeout = timeout;
    }

    /// Replace all thresholds at once.
    pub fn apply_config(&self, config: CircuitBreakerConfig) {
        *self.config.write() = normalize(config);
    }

    /// Current thresholds.
    #[must_use]
    pub fn config(&self) -> CircuitBreakerConfig {
        *self.config.read()
    }

    /// Capture thresholds and every service record.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let config = self.config();
        let services = self
            .services
            .read()
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    ServiceSnapshot {
                        state: record.state,
                        error_count: record.error_count,
                        success_count: record.success_count,
                        since_state_change_ms: millis(record.last_state_change.elapsed()),
                    },
                )
            })
            .collect();

        CircuitBreakerSnapshot {
            error_threshold: config.error_threshold,
            success_threshold: config.success_threshold,
            timeout_ms: millis(config.timeout),
            fallback_disabled: self.is_fallback_disabled(),
            services,
        }
    }
}

fn normalize(config: CircuitBreakerConfig) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        error_threshold: config.error_threshold.max(1),
        success_threshold: config.success_threshold.max(1),
        timeout: config.timeout,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
