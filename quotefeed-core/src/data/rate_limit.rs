//! Per-provider call budgets.
//!
//! Two policies coexist:
//! - [`RatePolicy::Quota`]: at most N calls per rolling window. When the
//!   budget is spent, [`RateLimiter::acquire`] returns
//!   [`DataError::RateLimited`] with the time left in the window, and the
//!   caller cools down and retries.
//! - [`RatePolicy::Polite`]: never gated; [`RateLimiter::record_call`]
//!   returns a fixed pause the caller sleeps after each successful call.
//!
//! Budgets are never shared between providers. Time comes from an injected
//! [`Clock`] so cooldowns can be tested without sleeping.

use crate::data::provider::{DataError, ProviderId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Source of time for the limiter and the retry loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on. Records every sleep.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += duration;
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

/// Call policy for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePolicy {
    /// At most `calls` per rolling `window`; over-budget calls are refused.
    Quota { calls: u32, window: Duration },
    /// Always allowed, followed by a fixed pause.
    Polite { interval: Duration },
    /// No limit.
    Unlimited,
}

impl RatePolicy {
    /// Alpha Vantage free tier: 5 calls per minute.
    pub const ALPHA_VANTAGE: RatePolicy = RatePolicy::Quota {
        calls: 5,
        window: Duration::from_secs(60),
    };

    /// Twelve Data free tier: 8 calls per minute.
    pub const TWELVE_DATA: RatePolicy = RatePolicy::Quota {
        calls: 8,
        window: Duration::from_secs(60),
    };

    /// One second between scraped requests.
    pub const POLITE: RatePolicy = RatePolicy::Polite {
        interval: Duration::from_secs(1),
    };
}

/// Call history for a provider under a quota.
#[derive(Debug, Default)]
struct CallLog {
    calls: VecDeque<Instant>,
}

impl CallLog {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Rate limiter holding an independent budget per provider.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    policies: Mutex<HashMap<ProviderId, RatePolicy>>,
    logs: Mutex<HashMap<ProviderId, CallLog>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            policies: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter on the wall clock.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    fn lock_policies(&self) -> MutexGuard<'_, HashMap<ProviderId, RatePolicy>> {
        self.policies.lock().unwrap_or_else(|poisoned| {
            warn!("rate limiter policies mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_logs(&self) -> MutexGuard<'_, HashMap<ProviderId, CallLog>> {
        self.logs.lock().unwrap_or_else(|poisoned| {
            warn!("rate limiter call log mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Set the policy for a provider, discarding its call history.
    pub fn configure(&self, provider: ProviderId, policy: RatePolicy) {
        self.lock_policies().insert(provider, policy);
        self.lock_logs().remove(&provider);
    }

    pub fn policy(&self, provider: ProviderId) -> RatePolicy {
        self.lock_policies()
            .get(&provider)
            .copied()
            .unwrap_or(RatePolicy::Unlimited)
    }

    /// Check whether a call to `provider` is permitted right now.
    ///
    /// Quota providers over budget get [`DataError::RateLimited`] carrying
    /// the time until the oldest call leaves the window.
    pub fn acquire(&self, provider: ProviderId) -> Result<(), DataError> {
        let RatePolicy::Quota { calls, window } = self.policy(provider) else {
            return Ok(());
        };

        let now = self.clock.now();
        let mut logs = self.lock_logs();
        let log = logs.entry(provider).or_default();
        log.prune(now, window);

        if log.calls.len() < calls as usize {
            return Ok(());
        }

        let retry_after = log
            .calls
            .front()
            .map(|&oldest| window.saturating_sub(now.duration_since(oldest)));
        debug!(%provider, ?retry_after, "call budget exhausted");
        Err(DataError::RateLimited {
            provider,
            retry_after,
        })
    }

    /// Register a call against `provider`'s budget. Returns the pause the
    /// caller owes after a successful call (zero unless the policy is polite).
    pub fn record_call(&self, provider: ProviderId) -> Duration {
        match self.policy(provider) {
            RatePolicy::Quota { window, .. } => {
                let now = self.clock.now();
                let mut logs = self.lock_logs();
                let log = logs.entry(provider).or_default();
                log.prune(now, window);
                log.calls.push_back(now);
                Duration::ZERO
            }
            RatePolicy::Polite { interval } => interval,
            RatePolicy::Unlimited => Duration::ZERO,
        }
    }

    /// Calls still available in the current window, `None` when ungated.
    pub fn remaining(&self, provider: ProviderId) -> Option<u32> {
        let RatePolicy::Quota { calls, window } = self.policy(provider) else {
            return None;
        };
        let now = self.clock.now();
        let mut logs = self.lock_logs();
        let log = logs.entry(provider).or_default();
        log.prune(now, window);
        Some(calls.saturating_sub(log.calls.len() as u32))
    }

    /// Suspend the calling flow on the limiter's clock.
    pub fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            self.clock.sleep(duration);
        }
    }
}
