//! Run configuration.
//!
//! Built once by the binary from defaults, an optional TOML file and the
//! process environment (later sources win), then passed by value into the
//! pipeline. Nothing below this module reads the environment.

use crate::data::provider::DataError;
use crate::domain::{DateRange, SymbolList};
use crate::pipeline::{Market, RetryPolicy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Everything a run needs besides the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    /// Newline-separated US tickers (`SYMBOLS`).
    pub symbols: String,
    /// Newline-separated index symbols (`SYMBOLS_IDX`).
    pub index_symbols: String,
    /// Newline-separated Taiwan codes (`SYMBOLS_TW`).
    pub tw_symbols: String,
    /// Alpha Vantage key (`API_KEY`).
    pub alpha_vantage_key: Option<String>,
    /// Twelve Data key (`TWELVE_DATA_API_KEY`).
    pub twelve_data_key: Option<String>,
    /// Calendar days before today included in the window.
    pub lookback_days: u32,
    /// Rate-limited retries per symbol; unset retries forever.
    pub max_rate_limit_retries: Option<u32>,
    /// Cooldown when a rate-limit signal carries no wait hint.
    pub cooldown_secs: u64,
    /// Pause after each call to a scraped endpoint.
    pub polite_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: String::new(),
            index_symbols: String::new(),
            tw_symbols: String::new(),
            alpha_vantage_key: None,
            twelve_data_key: None,
            lookback_days: 30,
            max_rate_limit_retries: None,
            cooldown_secs: 60,
            polite_delay_ms: 1000,
            http_timeout_secs: 30,
        }
    }
}

impl FeedConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string. Missing keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Config(format!("parse config TOML: {e}")))
    }

    /// Overlay environment variables. Unknown keys are ignored.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                "SYMBOLS" => self.symbols = value,
                "SYMBOLS_IDX" => self.index_symbols = value,
                "SYMBOLS_TW" => self.tw_symbols = value,
                "API_KEY" => self.alpha_vantage_key = non_empty(value),
                "TWELVE_DATA_API_KEY" => self.twelve_data_key = non_empty(value),
                "LOOKBACK_DAYS" => self.lookback_days = parse_var("LOOKBACK_DAYS", &value)?,
                "MAX_RATE_LIMIT_RETRIES" => {
                    self.max_rate_limit_retries = match value.trim() {
                        "" | "unbounded" | "none" => None,
                        v => Some(parse_var("MAX_RATE_LIMIT_RETRIES", v)?),
                    }
                }
                "COOLDOWN_SECS" => self.cooldown_secs = parse_var("COOLDOWN_SECS", &value)?,
                "POLITE_DELAY_MS" => self.polite_delay_ms = parse_var("POLITE_DELAY_MS", &value)?,
                "HTTP_TIMEOUT_SECS" => {
                    self.http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", &value)?
                }
                _ => {}
            }
        }
        Ok(self)
    }

    /// The symbol list for a market.
    pub fn symbols(&self, market: Market) -> SymbolList {
        let text = match market {
            Market::Us => &self.symbols,
            Market::Index => &self.index_symbols,
            Market::Taiwan => &self.tw_symbols,
        };
        SymbolList::parse(text)
    }

    /// The run's window, ending today.
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        DateRange::trailing_days(today, self.lookback_days)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_rate_limit_retries,
            cooldown: Duration::from_secs(self.cooldown_secs),
            ..RetryPolicy::default()
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn polite_delay(&self) -> Duration {
        Duration::from_millis(self.polite_delay_ms)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, DataError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DataError::Config(format!("{key}={value:?}: {e}")))
}
