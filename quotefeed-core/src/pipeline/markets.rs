//! Preset fallback chains for the three run variants.
//!
//! - US equities: one time-series API, retried under its quota.
//! - Indices: the Nasdaq index API, paced politely.
//! - Taiwan: TWSE dump, then TPEX dump, then MarketWatch per symbol.

use super::resolver::{DumpResolver, FeedResolver, RetryPolicy};
use super::run::Pipeline;
use crate::config::FeedConfig;
use crate::data::alpha_vantage::AlphaVantageProvider;
use crate::data::bulk_dump::BulkDumpSource;
use crate::data::market_watch::MarketWatchProvider;
use crate::data::nasdaq::NasdaqIndexProvider;
use crate::data::provider::{BulkSource, DataError, ProviderId, QuoteProvider};
use crate::data::rate_limit::{RateLimiter, RatePolicy};
use crate::data::twelve_data::TwelveDataProvider;
use crate::domain::DateRange;
use crate::export::ExportFormat;
use chrono::NaiveDate;
use std::sync::Arc;

/// Suffix appended to Taiwan symbols in the export.
pub const TAIWAN_SUFFIX: &str = "tw";

/// Which run variant to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Us,
    Index,
    Taiwan,
}

impl Market {
    pub fn export_format(&self) -> ExportFormat {
        match self {
            Market::Us | Market::Index => ExportFormat::new(),
            Market::Taiwan => ExportFormat::with_suffix(TAIWAN_SUFFIX),
        }
    }
}

/// Time-series API used for US equities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UsProvider {
    #[default]
    AlphaVantage,
    TwelveData,
}

/// One per-symbol provider, no fallback. Any provider error ends the run.
pub fn single_source(
    range: DateRange,
    format: ExportFormat,
    provider: Box<dyn QuoteProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
) -> Pipeline {
    Pipeline::new(range, format).with_resolver(Box::new(FeedResolver::new(
        provider, limiter, retry,
    )))
}

/// Exchange dumps in priority order, then a per-symbol fallback.
///
/// Both dumps are fetched here, once, before any symbol is processed; a
/// failed dump fetch is returned as an error.
pub fn with_dumps(
    range: DateRange,
    format: ExportFormat,
    dumps: &[&dyn BulkSource],
    fallback: Box<dyn QuoteProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
) -> Result<Pipeline, DataError> {
    let mut pipeline = Pipeline::new(range, format);
    for source in dumps {
        pipeline = pipeline.with_resolver(Box::new(DumpResolver::fetch(*source)?));
    }
    Ok(pipeline.with_resolver(Box::new(FeedResolver::new(fallback, limiter, retry))))
}

fn require_key(key: &Option<String>, var: &str) -> Result<String, DataError> {
    key.clone()
        .ok_or_else(|| DataError::Config(format!("{var} is not set")))
}

/// Build the live pipeline for a market, configuring the limiter's policies.
pub fn build_pipeline(
    config: &FeedConfig,
    market: Market,
    us_provider: UsProvider,
    today: NaiveDate,
    limiter: Arc<RateLimiter>,
) -> Result<Pipeline, DataError> {
    let range = config.date_range(today);
    let retry = config.retry_policy();
    let timeout = config.http_timeout();
    let polite = RatePolicy::Polite {
        interval: config.polite_delay(),
    };
    let format = market.export_format();

    match market {
        Market::Us => {
            let provider: Box<dyn QuoteProvider> = match us_provider {
                UsProvider::AlphaVantage => {
                    limiter.configure(ProviderId::AlphaVantage, RatePolicy::ALPHA_VANTAGE);
                    let key = require_key(&config.alpha_vantage_key, "API_KEY")?;
                    Box::new(AlphaVantageProvider::new(key, timeout)?)
                }
                UsProvider::TwelveData => {
                    limiter.configure(ProviderId::TwelveData, RatePolicy::TWELVE_DATA);
                    let key = require_key(&config.twelve_data_key, "TWELVE_DATA_API_KEY")?;
                    Box::new(TwelveDataProvider::new(key, timeout)?)
                }
            };
            Ok(single_source(range, format, provider, limiter, retry))
        }
        Market::Index => {
            limiter.configure(ProviderId::NasdaqIndex, polite);
            let provider = Box::new(NasdaqIndexProvider::new(timeout)?);
            Ok(single_source(range, format, provider, limiter, retry))
        }
        Market::Taiwan => {
            limiter.configure(ProviderId::MarketWatch, polite);
            let twse = BulkDumpSource::twse(timeout)?;
            let tpex = BulkDumpSource::tpex(timeout)?;
            let fallback = Box::new(MarketWatchProvider::new(TAIWAN_SUFFIX, timeout)?);
            let dumps: [&dyn BulkSource; 2] = [&twse, &tpex];
            with_dumps(range, format, &dumps, fallback, limiter, retry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_taiwan_lines_carry_a_suffix() {
        assert_eq!(Market::Taiwan.export_format().suffix(), "tw");
        assert_eq!(Market::Us.export_format().suffix(), "");
        assert_eq!(Market::Index.export_format().suffix(), "");
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let limiter = Arc::new(RateLimiter::system());
        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let result = build_pipeline(
            &FeedConfig::default(),
            Market::Us,
            UsProvider::AlphaVantage,
            today,
            limiter,
        );
        assert!(matches!(result, Err(DataError::Config(_))));
    }

    #[test]
    fn index_pipeline_is_single_source_and_polite() {
        let limiter = Arc::new(RateLimiter::system());
        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let pipeline = build_pipeline(
            &FeedConfig::default(),
            Market::Index,
            UsProvider::default(),
            today,
            limiter.clone(),
        )
        .unwrap();
        assert_eq!(pipeline.providers(), vec![ProviderId::NasdaqIndex]);
        assert_eq!(limiter.policy(ProviderId::NasdaqIndex), RatePolicy::POLITE);
    }
}
