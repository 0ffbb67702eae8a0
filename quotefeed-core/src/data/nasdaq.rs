//! Nasdaq historical index quotes.
//!
//! Unauthenticated JSON endpoint that rejects obvious bots, so requests carry
//! a browser-like User-Agent. Prices and volume come back as display strings
//! (`"16,265.64"`, `"--"` for no-trade days) with `MM/DD/YYYY` dates. Volume
//! is already in the ledger's unit.

use crate::data::http::{self, HttpBody, BROWSER_USER_AGENT};
use crate::data::normalize::{DateFormat, FieldParser};
use crate::data::provider::{DataError, ProviderId, QuoteProvider, VolumeScale};
use crate::domain::{CanonicalRow, DateRange};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.nasdaq.com/api/quote";

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    data: Option<HistoricalData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoricalData {
    trades_table: TradesTable,
}

#[derive(Debug, Deserialize)]
struct TradesTable {
    #[serde(default)]
    rows: Option<Vec<TradeRow>>,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    date: String,
    close: String,
    high: String,
    low: String,
    #[serde(default)]
    volume: Option<String>,
}

/// Nasdaq `historical?assetclass=index` provider.
pub struct NasdaqIndexProvider {
    client: Client,
    base_url: String,
}

impl NasdaqIndexProvider {
    pub fn new(timeout: Duration) -> Result<Self, DataError> {
        Ok(Self {
            client: http::build_client(ProviderId::NasdaqIndex, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn parse_response(symbol: &str, body: &str) -> Result<Vec<CanonicalRow>, DataError> {
        let provider = ProviderId::NasdaqIndex;
        let response: HistoricalResponse = serde_json::from_str(body)
            .map_err(|e| DataError::malformed_body(provider, format!("invalid JSON: {e}")))?;

        let data = response.data.ok_or_else(|| {
            DataError::malformed_body(provider, format!("no data for index '{symbol}'"))
        })?;

        let fields = FieldParser::new(provider, symbol);
        let rows = data.trades_table.rows.unwrap_or_default();
        rows.iter()
            .map(|row| -> Result<CanonicalRow, DataError> {
                Ok(CanonicalRow {
                    symbol: symbol.to_string(),
                    date: fields.date(&row.date, DateFormat::UsSlash)?,
                    close: fields.price("close", &row.close)?,
                    high: fields.price("high", &row.high)?,
                    low: fields.price("low", &row.low)?,
                    volume: fields.volume("volume", row.volume.as_deref().unwrap_or("--"))?,
                })
            })
            .collect()
    }
}

impl QuoteProvider for NasdaqIndexProvider {
    fn id(&self) -> ProviderId {
        ProviderId::NasdaqIndex
    }

    fn volume_scale(&self) -> VolumeScale {
        VolumeScale::AsReported
    }

    fn fetch(&self, symbol: &str, range: &DateRange) -> Result<Vec<CanonicalRow>, DataError> {
        let from = range.from().format("%Y-%m-%d").to_string();
        let to = range.to().format("%Y-%m-%d").to_string();
        let url = format!("{}/{symbol}/historical", self.base_url);
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "*/*")
            .query(&[
                ("assetclass", "index"),
                ("fromdate", from.as_str()),
                ("todate", to.as_str()),
                ("limit", "9999"),
            ]);
        let HttpBody { text, .. } = http::send(self.id(), request)?;
        Self::parse_response(symbol, &text)
    }
}
