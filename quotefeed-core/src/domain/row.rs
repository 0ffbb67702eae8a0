//! CanonicalRow: the one price record every provider converges to.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

/// One trading day for one symbol, after provider-specific normalization.
///
/// Prices keep the scale the provider reported (`600` stays `600`, `600.50`
/// stays `600.50`). Volume is a non-negative share count; a provider's
/// no-trade sentinel becomes `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: u64,
}

/// Inclusive calendar window `[from, to]` computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `from` is after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// The window ending on `today` and reaching back `days` calendar days.
    pub fn trailing_days(today: NaiveDate, days: u32) -> Self {
        Self {
            from: today - Duration::days(i64::from(days)),
            to: today,
        }
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}
