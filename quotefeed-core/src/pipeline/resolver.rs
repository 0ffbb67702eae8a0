//! Resolver strategies tried in order for each symbol.
//!
//! Every strategy answers with the same three-way result: rows found, symbol
//! not known here (try the next strategy), or an error that ends the run.

use crate::data::bulk_dump::BulkDump;
use crate::data::provider::{
    BulkSource, DataError, FetchProgress, ProviderId, QuoteProvider, VolumeScale,
};
use crate::data::rate_limit::RateLimiter;
use crate::domain::{CanonicalRow, DateRange};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of asking one strategy about one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        provider: ProviderId,
        scale: VolumeScale,
        rows: Vec<CanonicalRow>,
    },
    NotFound,
}

/// A single step in a fallback chain.
pub trait Resolver {
    fn provider(&self) -> ProviderId;

    fn resolve(
        &self,
        symbol: &str,
        range: &DateRange,
        progress: &dyn FetchProgress,
    ) -> Result<Resolution, DataError>;
}

/// How rate-limit signals are absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rate-limited retries allowed per symbol; `None` retries forever.
    pub max_retries: Option<u32>,
    /// Sleep used when the signal carries no wait hint.
    pub cooldown: Duration,
    /// Prefer the limiter's or server's hint over the fixed cooldown.
    pub honor_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            cooldown: Duration::from_secs(60),
            honor_retry_after: true,
        }
    }
}

impl RetryPolicy {
    pub fn cooldown_for(&self, err: &DataError) -> Duration {
        match err {
            DataError::RateLimited {
                retry_after: Some(hint),
                ..
            } if self.honor_retry_after && !hint.is_zero() => *hint,
            _ => self.cooldown,
        }
    }
}

/// Looks a symbol up in an exchange dump fetched once per run.
pub struct DumpResolver {
    dump: BulkDump,
}

impl DumpResolver {
    pub fn new(dump: BulkDump) -> Self {
        Self { dump }
    }

    /// Fetch the dump now. A failure here invalidates fallback for every
    /// symbol, so it is returned rather than treated as "not found".
    pub fn fetch(source: &dyn BulkSource) -> Result<Self, DataError> {
        Ok(Self::new(source.fetch_dump()?))
    }
}

impl Resolver for DumpResolver {
    fn provider(&self) -> ProviderId {
        self.dump.provider()
    }

    fn resolve(
        &self,
        symbol: &str,
        _range: &DateRange,
        _progress: &dyn FetchProgress,
    ) -> Result<Resolution, DataError> {
        match self.dump.lookup(symbol) {
            None => Ok(Resolution::NotFound),
            Some(row) => Ok(Resolution::Found {
                provider: self.dump.provider(),
                scale: VolumeScale::PerHundred,
                rows: vec![row?],
            }),
        }
    }
}

/// Queries a per-symbol provider under the rate limiter, cooling down and
/// retrying the same request on every rate-limit signal.
pub struct FeedResolver {
    provider: Box<dyn QuoteProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl FeedResolver {
    pub fn new(
        provider: Box<dyn QuoteProvider>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            retry,
        }
    }

    fn attempt(&self, symbol: &str, range: &DateRange) -> Result<Vec<CanonicalRow>, DataError> {
        let id = self.provider.id();
        self.limiter.acquire(id)?;
        let pause = self.limiter.record_call(id);
        let rows = self.provider.fetch(symbol, range)?;
        self.limiter.sleep(pause);
        Ok(rows)
    }
}

impl Resolver for FeedResolver {
    fn provider(&self) -> ProviderId {
        self.provider.id()
    }

    fn resolve(
        &self,
        symbol: &str,
        range: &DateRange,
        progress: &dyn FetchProgress,
    ) -> Result<Resolution, DataError> {
        let id = self.provider.id();
        let mut limited = 0u32;

        loop {
            match self.attempt(symbol, range) {
                Ok(rows) => {
                    debug!(provider = %id, symbol, rows = rows.len(), "fetched");
                    return Ok(Resolution::Found {
                        provider: id,
                        scale: self.provider.volume_scale(),
                        rows,
                    });
                }
                Err(err) if err.is_rate_limited() => {
                    limited += 1;
                    if self.retry.max_retries.is_some_and(|max| limited > max) {
                        return Err(DataError::RetriesExhausted {
                            provider: id,
                            symbol: symbol.to_string(),
                            attempts: limited,
                        });
                    }
                    let wait = self.retry.cooldown_for(&err);
                    warn!(provider = %id, symbol, wait_secs = wait.as_secs_f64(), "rate limited, cooling down");
                    progress.on_cooldown(id, symbol, wait);
                    self.limiter.sleep(wait);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
