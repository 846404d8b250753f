//! Continuous token-bucket rate limiting.
//!
//! A [`RateLimiter`] holds a bucket of at most `burst` tokens that refills at
//! `rate` tokens per second. On each call the elapsed time since the last
//! refill is converted to (fractional) tokens, then one whole token is
//! consumed if available. Fractions carry over between calls, so admission is
//! smooth at sub-second granularity rather than stepping once per interval.
//!
//! [`RateLimitManager`] owns one limiter per key and creates them on first
//! reference with the manager's defaults.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

#[derive(Debug)]
struct Bucket {
    rate: f64,
    burst: u32,
    tokens: f64,
    last_refill: Instant,
    enabled: bool,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(f64::from(self.burst));
        self.last_refill = now;
    }
}

/// Token-bucket limiter for a single key.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterSnapshot {
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Tokens currently available, before any pending refill.
    pub tokens: f64,
    /// Whether the limiter is enforcing.
    pub enabled: bool,
    /// Milliseconds since the bucket was last refilled.
    pub since_refill_ms: u64,
}

impl RateLimiter {
    /// Create a limiter that starts with a full bucket.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::new_at(rate, burst, Instant::now())
    }

    /// Create a limiter whose refill clock starts at `now`.
    #[must_use]
    pub fn new_at(rate: f64, burst: u32, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                rate: sanitize_rate(rate),
                burst,
                tokens: f64::from(burst),
                last_refill: now,
                enabled: true,
            }),
        }
    }

    /// Try to admit one request.
    #[must_use]
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Try to admit one request at the given instant.
    ///
    /// A disabled limiter always admits and does not touch the bucket.
    #[must_use]
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        if !bucket.enabled {
            return true;
        }
        bucket.refill(now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Change the refill rate. Tokens accrued so far are credited at the old rate.
    pub fn set_rate(&self, rate: f64) {
        let mut bucket = self.bucket.lock();
        bucket.refill(Instant::now());
        bucket.rate = sanitize_rate(rate);
    }

    /// Change the bucket capacity, clamping the current token count to it.
    pub fn set_burst(&self, burst: u32) {
        let mut bucket = self.bucket.lock();
        bucket.burst = burst;
        bucket.tokens = bucket.tokens.min(f64::from(burst));
    }

    /// Resume enforcing.
    pub fn enable(&self) {
        self.bucket.lock().enabled = true;
    }

    /// Stop enforcing; every call admits until re-enabled.
    pub fn disable(&self) {
        self.bucket.lock().enabled = false;
    }

    /// Whether the limiter is enforcing.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.bucket.lock().enabled
    }

    /// Current rate and burst.
    #[must_use]
    pub fn limits(&self) -> (f64, u32) {
        let bucket = self.bucket.lock();
        (bucket.rate, bucket.burst)
    }

    /// Capture the limiter state.
    #[must_use]
    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let bucket = self.bucket.lock();
        RateLimiterSnapshot {
            rate: bucket.rate,
            burst: bucket.burst,
            tokens: bucket.tokens,
            enabled: bucket.enabled,
            since_refill_ms: u64::try_from(bucket.last_refill.elapsed().as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}

#[derive(Debug)]
struct Slot {
    limiter: Arc<RateLimiter>,
    /// Set once the key has been explicitly reconfigured; such limiters keep
    /// their settings when the defaults change.
    pinned: AtomicBool,
}

#[derive(Debug, Clone, Copy)]
struct Defaults {
    rate: f64,
    burst: u32,
}

/// Keyed collection of rate limiters.
#[derive(Debug)]
pub struct RateLimitManager {
    limiters: RwLock<HashMap<String, Slot>>,
    defaults: RwLock<Defaults>,
}

impl RateLimitManager {
    /// Create a manager whose lazily created limiters use these defaults.
    #[must_use]
    pub fn new(default_rate: f64, default_burst: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            defaults: RwLock::new(Defaults {
                rate: sanitize_rate(default_rate),
                burst: default_burst,
            }),
        }
    }

    /// Get the limiter for `key`, creating it with the defaults if absent.
    #[must_use]
    pub fn get_rate_limiter(&self, key: &str) -> Arc<RateLimiter> {
        if let Some(slot) = self.limiters.read().get(key) {
            return Arc::clone(&slot.limiter);
        }

        let mut limiters = self.limiters.write();
        // Another caller may have inserted between the two locks.
        if let Some(slot) = limiters.get(key) {
            return Arc::clone(&slot.limiter);
        }

        let defaults = *self.defaults.read();
        let limiter = Arc::new(RateLimiter::new(defaults.rate, defaults.burst));
        limiters.insert(
            key.to_string(),
            Slot {
                limiter: Arc::clone(&limiter),
                pinned: AtomicBool::new(false),
            },
        );
        tracing::debug!(key = %key, rate = defaults.rate, burst = defaults.burst, "Rate limiter created");
        limiter
    }

    /// Admit or reject one request for `key`.
    #[must_use]
    pub fn allow(&self, key: &str) -> bool {
        self.get_rate_limiter(key).allow()
    }

    /// Drop the limiter for `key`. Returns whether one existed.
    pub fn remove_rate_limiter(&self, key: &str) -> bool {
        self.limiters.write().remove(key).is_some()
    }

    /// Set rate and burst for `key`, creating the limiter if needed.
    ///
    /// The key keeps these settings across later [`RateLimitManager::set_defaults`] calls.
    pub fn update_rate_limiter(&self, key: &str, rate: f64, burst: u32) -> Arc<RateLimiter> {
        let limiter = self.get_rate_limiter(key);
        limiter.set_rate(rate);
        limiter.set_burst(burst);
        if let Some(slot) = self.limiters.read().get(key) {
            slot.pinned.store(true, Ordering::Relaxed);
        }
        tracing::info!(key = %key, rate, burst, "Rate limiter updated");
        limiter
    }

    /// Enable enforcement for `key`, creating the limiter if needed.
    pub fn enable_rate_limiter(&self, key: &str) {
        self.get_rate_limiter(key).enable();
    }

    /// Disable enforcement for `key`, creating the limiter if needed.
    pub fn disable_rate_limiter(&self, key: &str) {
        self.get_rate_limiter(key).disable();
    }

    /// Snapshot every limiter, ordered by key.
    #[must_use]
    pub fn get_all_rate_limiters(&self) -> BTreeMap<String, RateLimiterSnapshot> {
        self.limiters
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.limiter.snapshot()))
            .collect()
    }

    /// Change the defaults used for new limiters.
    ///
    /// Existing limiters that were never explicitly reconfigured are retuned
    /// to the new values as well.
    pub fn set_defaults(&self, rate: f64, burst: u32) {
        *self.defaults.write() = Defaults {
            rate: sanitize_rate(rate),
            burst,
        };

        let limiters = self.limiters.read();
        let mut retuned = 0usize;
        for slot in limiters.values() {
            if !slot.pinned.load(Ordering::Relaxed) {
                slot.limiter.set_rate(rate);
                slot.limiter.set_burst(burst);
                retuned += 1;
            }
        }
        tracing::info!(rate, burst, retuned, "Rate limit defaults changed");
    }

    /// Current default rate and burst.
    #[must_use]
    pub fn defaults(&self) -> (f64, u32) {
        let defaults = *self.defaults.read();
        (defaults.rate, defaults.burst)
    }

    /// Number of limiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.read().len()
    }

    /// Check if no limiter has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.read().is_empty()
    }
}
