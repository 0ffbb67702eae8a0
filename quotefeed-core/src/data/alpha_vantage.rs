//! Alpha Vantage daily time series.
//!
//! Authenticated JSON API returning the whole daily series; rows before the
//! window start are dropped here. The free tier allows 5 calls per minute and
//! answers over-quota requests with a `Note` (or `Information`) body instead
//! of data, which is surfaced as a rate-limit signal.

use crate::data::http::{self, HttpBody};
use crate::data::normalize::{DateFormat, FieldParser};
use crate::data::provider::{DataError, ProviderId, QuoteProvider, VolumeScale};
use crate::domain::{CanonicalRow, DateRange};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Calendar days the `compact` output (latest 100 trading days) safely covers.
const COMPACT_SPAN_DAYS: i64 = 140;

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, DailyBar>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// Alpha Vantage `TIME_SERIES_DAILY` provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        Ok(Self {
            client: http::build_client(ProviderId::AlphaVantage, timeout)?,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the provider at another host (proxies, recorded servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse a `TIME_SERIES_DAILY` body into rows inside `range`, newest first.
    pub fn parse_response(
        symbol: &str,
        range: &DateRange,
        body: &str,
    ) -> Result<Vec<CanonicalRow>, DataError> {
        let provider = ProviderId::AlphaVantage;
        let response: DailyResponse = serde_json::from_str(body)
            .map_err(|e| DataError::malformed_body(provider, format!("invalid JSON: {e}")))?;

        if let Some(message) = response.error_message {
            return Err(DataError::malformed_body(provider, message));
        }

        let Some(series) = response.time_series else {
            if let Some(note) = response.note.or(response.information) {
                warn!(%provider, %note, "server-side quota message");
                return Err(DataError::RateLimited {
                    provider,
                    retry_after: None,
                });
            }
            return Err(DataError::malformed_body(
                provider,
                "no \"Time Series (Daily)\" in response",
            ));
        };

        let fields = FieldParser::new(provider, symbol);
        let mut rows = Vec::new();
        for (date, bar) in series.iter().rev() {
            let date = fields.date(date, DateFormat::Iso)?;
            if !range.contains(date) {
                continue;
            }
            rows.push(CanonicalRow {
                symbol: symbol.to_string(),
                date,
                close: fields.price("close", &bar.close)?,
                high: fields.price("high", &bar.high)?,
                low: fields.price("low", &bar.low)?,
                volume: fields.volume("volume", &bar.volume)?,
            });
        }

        debug!(%provider, symbol, rows = rows.len(), "parsed daily series");
        Ok(rows)
    }
}

/// `compact` unless the window reaches past the last 100 trading days.
fn output_size(range: &DateRange) -> &'static str {
    if (range.to() - range.from()).num_days() > COMPACT_SPAN_DAYS {
        "full"
    } else {
        "compact"
    }
}

impl QuoteProvider for AlphaVantageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::AlphaVantage
    }

    fn volume_scale(&self) -> VolumeScale {
        VolumeScale::PerHundred
    }

    fn fetch(&self, symbol: &str, range: &DateRange) -> Result<Vec<CanonicalRow>, DataError> {
        let request = self.client.get(&self.base_url).query(&[
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", output_size(range)),
            ("apikey", self.api_key.as_str()),
        ]);
        let HttpBody { text, .. } = http::send(self.id(), request)?;
        Self::parse_response(symbol, range, &text)
    }
}
