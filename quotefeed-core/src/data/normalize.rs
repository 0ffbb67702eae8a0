//! Field normalization shared by every adapter.
//!
//! Providers disagree on units and encodings: volume may be a plain number,
//! a comma-grouped string or the `--` no-trade sentinel; dates arrive as
//! ISO, `MM/DD/YYYY`, compact `YYYYMMDD` or ROC-calendar strings. These
//! helpers turn each into the canonical representation and report failures
//! as [`DataError::MalformedRecord`] against the provider and symbol.

use crate::data::provider::{DataError, ProviderId};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Offset between the ROC (Minguo) calendar year and the Gregorian year.
pub const ROC_YEAR_OFFSET: i32 = 1911;

/// Marker providers use for "no trades" in the volume column.
const NO_TRADE: &str = "--";

/// Date encodings seen across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `2024-03-12`
    Iso,
    /// `03/12/2024`
    UsSlash,
    /// `20240312`
    Compact,
    /// `113/03/12` or `1130312` (year + 1911)
    Roc,
}

/// Parse a date in the given encoding.
pub fn parse_date(raw: &str, format: DateFormat) -> Option<NaiveDate> {
    let raw = raw.trim();
    match format {
        DateFormat::Iso => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        DateFormat::UsSlash => NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok(),
        DateFormat::Compact => NaiveDate::parse_from_str(raw, "%Y%m%d").ok(),
        DateFormat::Roc => parse_roc_date(raw),
    }
}

fn parse_roc_date(raw: &str) -> Option<NaiveDate> {
    let (year, month, day) = if raw.contains('/') {
        let mut parts = raw.split('/');
        let fields = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        fields
    } else {
        // Compact form: the last four digits are MMDD, the rest is the year.
        if raw.len() < 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let split = raw.len() - 4;
        (&raw[..split], &raw[split..split + 2], &raw[split + 2..])
    };

    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(
        year.checked_add(ROC_YEAR_OFFSET)?,
        month.parse().ok()?,
        day.parse().ok()?,
    )
}

/// Normalize a volume field to a share count.
///
/// Accepts plain integers, comma-grouped integers, integral decimals
/// (`"1200.0"`) and the `--` sentinel, which becomes `0`. Applying it to its
/// own output is a no-op.
pub fn normalize_volume(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NO_TRADE {
        return Some(0);
    }

    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    if let Ok(v) = digits.parse::<u64>() {
        return Some(v);
    }

    let value = Decimal::from_str(&digits).ok()?;
    if value.is_sign_negative() || !value.fract().is_zero() {
        return None;
    }
    value.trunc().to_u64()
}

/// Parse a price, dropping thousands separators but keeping the reported scale.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let digits: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return None;
    }
    Decimal::from_str(&digits).ok()
}

/// Binds a provider and symbol to field parsing so adapters get uniform
/// [`DataError::MalformedRecord`] errors.
#[derive(Debug, Clone, Copy)]
pub struct FieldParser<'a> {
    provider: ProviderId,
    symbol: &'a str,
}

impl<'a> FieldParser<'a> {
    pub fn new(provider: ProviderId, symbol: &'a str) -> Self {
        Self { provider, symbol }
    }

    pub fn price(&self, field: &str, raw: &str) -> Result<Decimal, DataError> {
        parse_price(raw).ok_or_else(|| self.malformed(format!("{field} is not a price: {raw:?}")))
    }

    pub fn volume(&self, field: &str, raw: &str) -> Result<u64, DataError> {
        normalize_volume(raw)
            .ok_or_else(|| self.malformed(format!("{field} is not a share count: {raw:?}")))
    }

    pub fn date(&self, raw: &str, format: DateFormat) -> Result<NaiveDate, DataError> {
        parse_date(raw, format)
            .ok_or_else(|| self.malformed(format!("unparsable {format:?} date {raw:?}")))
    }

    pub fn malformed(&self, detail: impl Into<String>) -> DataError {
        DataError::MalformedRecord {
            provider: self.provider,
            symbol: self.symbol.to_string(),
            detail: detail.into(),
        }
    }
}
