//! Twelve Data daily time series.

use crate::data::http::{self, HttpBody};
use crate::data::normalize::{DateFormat, FieldParser};
use crate::data::provider::{DataError, ProviderId, QuoteProvider, VolumeScale};
use crate::domain::{CanonicalRow, DateRange};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "https://api.twelvedata.com/time_series";

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    status: String,
    code: Option<u16>,
    message: Option<String>,
    #[serde(default)]
    values: Vec<SeriesValue>,
}

#[derive(Debug, Deserialize)]
struct SeriesValue {
    datetime: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

/// Twelve Data `time_series?interval=1day` provider.
pub struct TwelveDataProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TwelveDataProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        Ok(Self {
            client: http::build_client(ProviderId::TwelveData, timeout)?,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse a `time_series` body. Error bodies come back with HTTP 200 and
    /// `"status": "error"`; code 429 is the quota signal.
    pub fn parse_response(
        symbol: &str,
        range: &DateRange,
        body: &str,
    ) -> Result<Vec<CanonicalRow>, DataError> {
        let provider = ProviderId::TwelveData;
        let response: SeriesResponse = serde_json::from_str(body)
            .map_err(|e| DataError::malformed_body(provider, format!("invalid JSON: {e}")))?;

        if response.status != "ok" {
            let message = response.message.unwrap_or_default();
            return Err(match response.code {
                Some(429) => DataError::RateLimited {
                    provider,
                    retry_after: None,
                },
                Some(status) => DataError::HttpStatus {
                    provider,
                    status,
                    body: message,
                },
                None => DataError::malformed_body(provider, message),
            });
        }

        let fields = FieldParser::new(provider, symbol);
        let mut rows = Vec::with_capacity(response.values.len());
        for value in &response.values {
            // Intraday-shaped timestamps still start with the calendar date.
            let day = value.datetime.get(..10).unwrap_or(value.datetime.as_str());
            let date = fields.date(day, DateFormat::Iso)?;
            if !range.contains(date) {
                continue;
            }
            rows.push(CanonicalRow {
                symbol: symbol.to_string(),
                date,
                close: fields.price("close", &value.close)?,
                high: fields.price("high", &value.high)?,
                low: fields.price("low", &value.low)?,
                volume: fields.volume("volume", value.volume.as_deref().unwrap_or("--"))?,
            });
        }

        debug!(%provider, symbol, rows = rows.len(), "parsed time series");
        Ok(rows)
    }
}

impl QuoteProvider for TwelveDataProvider {
    fn id(&self) -> ProviderId {
        ProviderId::TwelveData
    }

    fn volume_scale(&self) -> VolumeScale {
        VolumeScale::PerHundred
    }

    fn fetch(&self, symbol: &str, range: &DateRange) -> Result<Vec<CanonicalRow>, DataError> {
        let start = range.from().format("%Y-%m-%d").to_string();
        let end = range.to().format("%Y-%m-%d").to_string();
        let request = self.client.get(&self.base_url).query(&[
            ("symbol", symbol),
            ("interval", "1day"),
            ("start_date", start.as_str()),
            ("end_date", end.as_str()),
            ("outputsize", "5000"),
            ("apikey", self.api_key.as_str()),
        ]);
        let HttpBody { text, .. } = http::send(self.id(), request)?;
        Self::parse_response(symbol, range, &text)
    }
}
