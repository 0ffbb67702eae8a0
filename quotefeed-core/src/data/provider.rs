//! Provider traits and structured error types.
//!
//! Every data source implements either [`QuoteProvider`] (queried once per
//! symbol) or [`BulkSource`] (one full-market dump per run). Both hand back
//! [`CanonicalRow`]s; provider-native shapes never leave the adapter.

use crate::data::bulk_dump::BulkDump;
use crate::domain::{CanonicalRow, DateRange};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identifies a data source. Rate-limit budgets are kept per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    AlphaVantage,
    TwelveData,
    NasdaqIndex,
    Twse,
    Tpex,
    MarketWatch,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::AlphaVantage => "alpha_vantage",
            ProviderId::TwelveData => "twelve_data",
            ProviderId::NasdaqIndex => "nasdaq_index",
            ProviderId::Twse => "twse",
            ProviderId::Tpex => "tpex",
            ProviderId::MarketWatch => "market_watch",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider's share volume maps onto the ledger's volume column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeScale {
    /// Provider reports raw shares; the ledger wants hundreds of shares.
    PerHundred,
    /// Provider already reports in the ledger's unit.
    AsReported,
}

/// Structured error types for provider and pipeline operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: ProviderId,
        /// Suggested wait, when the limiter or the server knows it.
        retry_after: Option<Duration>,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: ProviderId,
        status: u16,
        body: String,
    },

    #[error("network error talking to {provider}: {detail}")]
    Network { provider: ProviderId, detail: String },

    #[error("malformed response from {provider}: {detail}")]
    MalformedBody { provider: ProviderId, detail: String },

    #[error("malformed record from {provider} for '{symbol}': {detail}")]
    MalformedRecord {
        provider: ProviderId,
        symbol: String,
        detail: String,
    },

    #[error("missing response metadata from {provider}: {detail}")]
    MissingMetadata { provider: ProviderId, detail: String },

    #[error("no provider could resolve symbol '{symbol}'")]
    SymbolNotFound { symbol: String },

    #[error("gave up on '{symbol}' after {attempts} rate-limited attempts against {provider}")]
    RetriesExhausted {
        provider: ProviderId,
        symbol: String,
        attempts: u32,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Rate-limit signals are the only recoverable class; everything else
    /// means "this provider cannot answer".
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DataError::RateLimited { .. })
    }

    pub fn malformed_body(provider: ProviderId, detail: impl Into<String>) -> Self {
        DataError::MalformedBody {
            provider,
            detail: detail.into(),
        }
    }
}

/// A source queried once per symbol (time-series APIs, index API, CSV fallback).
pub trait QuoteProvider {
    fn id(&self) -> ProviderId;

    fn volume_scale(&self) -> VolumeScale;

    /// Fetch daily rows for `symbol`. Providers that accept a window use
    /// `range`; providers that don't return whatever series they serve.
    fn fetch(&self, symbol: &str, range: &DateRange) -> Result<Vec<CanonicalRow>, DataError>;
}

/// A full-market snapshot fetched once per run and indexed by symbol.
pub trait BulkSource {
    fn id(&self) -> ProviderId;

    fn fetch_dump(&self) -> Result<BulkDump, DataError>;
}

/// Progress callback for multi-symbol runs. Output goes to a side channel,
/// never to the export stream.
pub trait FetchProgress {
    /// Called before a symbol is resolved.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a rate-limit cooldown begins.
    fn on_cooldown(&self, provider: ProviderId, symbol: &str, wait: Duration);

    /// Called once a symbol's lines have been written.
    fn on_complete(&self, symbol: &str, provider: ProviderId, rows: usize);
}

/// Progress reporter that prints to stderr.
pub struct StderrProgress;

impl FetchProgress for StderrProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Getting \"{symbol}\" price", index + 1, total);
    }

    fn on_cooldown(&self, provider: ProviderId, symbol: &str, wait: Duration) {
        eprintln!(
            "  {provider} rate limit hit for {symbol}, sleeping {}s",
            wait.as_secs()
        );
    }

    fn on_complete(&self, _symbol: &str, _provider: ProviderId, _rows: usize) {}
}
