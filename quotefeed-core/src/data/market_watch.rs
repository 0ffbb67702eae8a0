//! MarketWatch CSV download, the per-symbol fallback for Taiwan listings
//! missing from both exchange dumps.
//!
//! The endpoint serves its own recent window regardless of the run's range.

use crate::data::http::{self, HttpBody};
use crate::data::normalize::{DateFormat, FieldParser};
use crate::data::provider::{DataError, ProviderId, QuoteProvider, VolumeScale};
use crate::domain::{CanonicalRow, DateRange};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://www.marketwatch.com/investing/fund";

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "High")]
    high: String,
    #[serde(rename = "Low")]
    low: String,
    #[serde(rename = "Close")]
    close: String,
    #[serde(rename = "Volume")]
    volume: String,
}

/// MarketWatch `downloaddatapartial` provider.
pub struct MarketWatchProvider {
    client: Client,
    base_url: String,
    country_code: String,
}

impl MarketWatchProvider {
    pub fn new(country_code: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        Ok(Self {
            client: http::build_client(ProviderId::MarketWatch, timeout)?,
            base_url: BASE_URL.to_string(),
            country_code: country_code.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn parse_response(symbol: &str, body: &str) -> Result<Vec<CanonicalRow>, DataError> {
        let provider = ProviderId::MarketWatch;
        let fields = FieldParser::new(provider, symbol);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(body.trim_start_matches('\u{feff}').as_bytes());

        let mut rows = Vec::new();
        for record in reader.deserialize::<CsvRow>() {
            let row = record
                .map_err(|e| DataError::malformed_body(provider, format!("bad CSV row: {e}")))?;
            rows.push(CanonicalRow {
                symbol: symbol.to_string(),
                date: fields.date(&row.date, DateFormat::UsSlash)?,
                close: fields.price("close", &row.close)?,
                high: fields.price("high", &row.high)?,
                low: fields.price("low", &row.low)?,
                volume: fields.volume("volume", &row.volume)?,
            });
        }
        Ok(rows)
    }
}

impl QuoteProvider for MarketWatchProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MarketWatch
    }

    fn volume_scale(&self) -> VolumeScale {
        VolumeScale::PerHundred
    }

    fn fetch(&self, symbol: &str, _range: &DateRange) -> Result<Vec<CanonicalRow>, DataError> {
        let url = format!(
            "{}/{}/downloaddatapartial",
            self.base_url,
            symbol.to_lowercase()
        );
        let request = self.client.get(url).query(&[
            ("frequency", "p1d"),
            ("csvdownload", "true"),
            ("countrycode", self.country_code.as_str()),
        ]);
        let HttpBody { text, .. } = http::send(self.id(), request)?;
        Self::parse_response(symbol, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_grouped_volume() {
        let body = "Date,Open,High,Low,Close,Volume\n\
                    03/12/2024,15.20,15.35,15.10,15.30,\"1,234,567\"\n\
                    03/11/2024,15.00,15.25,14.95,15.15,\"987,000\"\n";
        let rows = MarketWatchProvider::parse_response("00773B", body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "00773B");
        assert_eq!(rows[0].volume, 1_234_567);
        assert_eq!(rows[0].close.to_string(), "15.30");
        assert_eq!(rows[1].low.to_string(), "14.95");
    }

    #[test]
    fn header_only_body_is_empty() {
        let rows = MarketWatchProvider::parse_response("00773B", "Date,Open,High,Low,Close,Volume\n")
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn missing_column_is_a_malformed_body() {
        let body = "Date,Open,High,Low,Close\n03/12/2024,1,1,1,1\n";
        let err = MarketWatchProvider::parse_response("00773B", body).unwrap_err();
        assert!(matches!(err, DataError::MalformedBody { .. }));
    }
}
