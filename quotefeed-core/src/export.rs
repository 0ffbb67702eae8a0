//! Ledger import lines.
//!
//! One line per row, always in the same shape whichever provider answered:
//!
//! ```text
//! SYMBOL, CLOSE, ---, YYYY/MM/DD, ---, HIGH, LOW, VOLUME, *
//! ```
//!
//! `---` fill the import columns this feed never populates and `*` closes
//! the record.

use crate::data::provider::VolumeScale;
use crate::domain::CanonicalRow;
use rust_decimal::Decimal;

/// Date layout the ledger expects.
pub const LEDGER_DATE_FORMAT: &str = "%Y/%m/%d";

/// Shares per lot in the ledger's volume column.
const SHARES_PER_LOT: i64 = 100;

/// Renders canonical rows as ledger import lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFormat {
    suffix: String,
}

impl ExportFormat {
    /// Lines with the bare symbol.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines whose symbol carries a market suffix, e.g. `2330tw`.
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Format one row. No trailing newline.
    pub fn line(&self, row: &CanonicalRow, scale: VolumeScale) -> String {
        format!(
            "{}{}, {}, ---, {}, ---, {}, {}, {}, *",
            row.symbol,
            self.suffix,
            row.close,
            row.date.format(LEDGER_DATE_FORMAT),
            row.high,
            row.low,
            volume_column(row.volume, scale),
        )
    }
}

/// Volume as the ledger sees it. Share counts are divided into lots without
/// rounding, so a fractional lot stays fractional.
///
/// Whole lots print without a decimal point: 1200 shares is `12`, not `12.0`.
pub fn volume_column(volume: u64, scale: VolumeScale) -> String {
    match scale {
        VolumeScale::AsReported => volume.to_string(),
        VolumeScale::PerHundred => {
            let lots = Decimal::from(volume) / Decimal::from(SHARES_PER_LOT);
            lots.normalize().to_string()
        }
    }
}
