//! Exchange end-of-day dumps (TWSE and TPEX).
//!
//! Each exchange publishes one CSV covering every listed symbol for the
//! latest trading day. The dump is fetched once per run and indexed by
//! symbol. The CSV carries no date column: the trading date lives only in
//! the `Content-Disposition` filename, so a response whose filename cannot
//! be parsed aborts the run.
//!
//! Rows are indexed raw and normalized on lookup, so a garbled row only
//! fails the symbol it belongs to.

use crate::data::http::{self, HttpBody};
use crate::data::normalize::{parse_date, DateFormat, FieldParser};
use crate::data::provider::{BulkSource, DataError, ProviderId};
use crate::domain::CanonicalRow;
use chrono::NaiveDate;
use csv::StringRecord;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Where each field sits in an exchange's CSV, and how its filename encodes
/// the trading date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpLayout {
    pub provider: ProviderId,
    pub url: &'static str,
    /// Filename prefix preceding the date token, e.g. `STOCK_DAY_ALL_`.
    pub filename_prefix: &'static str,
    pub date_format: DateFormat,
    /// Title lines before the CSV header row.
    pub preamble_lines: usize,
    pub code: usize,
    pub close: usize,
    pub high: usize,
    pub low: usize,
    /// Share count (not lots).
    pub volume: usize,
}

impl DumpLayout {
    /// TWSE `STOCK_DAY_ALL` open data:
    /// code, name, volume, turnover, open, high, low, close, change, trades.
    pub const TWSE: DumpLayout = DumpLayout {
        provider: ProviderId::Twse,
        url: "https://www.twse.com.tw/exchangeReport/STOCK_DAY_ALL?response=open_data",
        filename_prefix: "STOCK_DAY_ALL_",
        date_format: DateFormat::Compact,
        preamble_lines: 0,
        code: 0,
        volume: 2,
        high: 5,
        low: 6,
        close: 7,
    };

    /// TPEX daily close quotes, dated in the ROC calendar:
    /// code, name, close, change, open, high, low, volume, ...
    pub const TPEX: DumpLayout = DumpLayout {
        provider: ProviderId::Tpex,
        url: "https://www.tpex.org.tw/web/stock/aftertrading/otc_quotes_no1430/stk_wn1430_result.php?l=zh-tw&o=data",
        filename_prefix: "RSTA3104_",
        date_format: DateFormat::Roc,
        preamble_lines: 2,
        code: 0,
        close: 2,
        high: 5,
        low: 6,
        volume: 7,
    };

    fn widest_column(&self) -> usize {
        [self.code, self.close, self.high, self.low, self.volume]
            .into_iter()
            .max()
            .unwrap_or(0)
    }

    /// Trading date from an attachment filename such as
    /// `STOCK_DAY_ALL_20210312.csv` or `RSTA3104_1130312.csv`.
    pub fn dump_date(&self, filename: &str) -> Result<NaiveDate, DataError> {
        let missing = |detail: String| DataError::MissingMetadata {
            provider: self.provider,
            detail,
        };

        let stem = filename
            .strip_suffix(".csv")
            .or_else(|| filename.strip_suffix(".CSV"))
            .ok_or_else(|| missing(format!("unexpected dump filename {filename:?}")))?;
        let token = stem
            .strip_prefix(self.filename_prefix)
            .ok_or_else(|| missing(format!("unexpected dump filename {filename:?}")))?;

        parse_date(token, self.date_format)
            .ok_or_else(|| missing(format!("no trading date in dump filename {filename:?}")))
    }
}

/// An exchange dump indexed by symbol.
#[derive(Debug, Clone)]
pub struct BulkDump {
    layout: DumpLayout,
    date: NaiveDate,
    rows: HashMap<String, StringRecord>,
}

impl BulkDump {
    /// Index a dump body. `filename` is the `Content-Disposition` filename.
    pub fn parse(layout: DumpLayout, filename: &str, body: &str) -> Result<Self, DataError> {
        let date = layout.dump_date(filename)?;

        let body = body.trim_start_matches('\u{feff}');
        let csv_text = skip_lines(body, layout.preamble_lines);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(csv_text.as_bytes());

        let width = layout.widest_column();
        let mut rows = HashMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                DataError::malformed_body(layout.provider, format!("bad CSV row: {e}"))
            })?;
            // Footer and note lines are shorter than a quote row.
            if record.len() <= width {
                continue;
            }
            let Some(code) = record.get(layout.code).map(clean_code) else {
                continue;
            };
            if code.is_empty() {
                continue;
            }
            rows.insert(code, record);
        }

        debug!(provider = %layout.provider, %date, symbols = rows.len(), "indexed dump");
        Ok(Self { layout, date, rows })
    }

    pub fn provider(&self) -> ProviderId {
        self.layout.provider
    }

    /// Trading date the dump represents.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.rows.contains_key(symbol)
    }

    /// `None` when the symbol is not in this dump; otherwise its row,
    /// normalized, or the error describing why it could not be.
    pub fn lookup(&self, symbol: &str) -> Option<Result<CanonicalRow, DataError>> {
        let record = self.rows.get(symbol)?;
        Some(self.normalize(symbol, record))
    }

    fn normalize(&self, symbol: &str, record: &StringRecord) -> Result<CanonicalRow, DataError> {
        let fields = FieldParser::new(self.layout.provider, symbol);
        let field = |index: usize| record.get(index).unwrap_or_default();
        Ok(CanonicalRow {
            symbol: symbol.to_string(),
            date: self.date,
            close: fields.price("close", field(self.layout.close))?,
            high: fields.price("high", field(self.layout.high))?,
            low: fields.price("low", field(self.layout.low))?,
            volume: fields.volume("volume", field(self.layout.volume))?,
        })
    }
}

/// TWSE sometimes spreadsheet-escapes codes as `="0050"`.
fn clean_code(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('=')
        .trim_matches('"')
        .trim()
        .to_string()
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Fetches an exchange dump over HTTP.
pub struct BulkDumpSource {
    client: Client,
    layout: DumpLayout,
    url: String,
}

impl BulkDumpSource {
    pub fn new(layout: DumpLayout, timeout: Duration) -> Result<Self, DataError> {
        Ok(Self {
            client: http::build_client(layout.provider, timeout)?,
            layout,
            url: layout.url.to_string(),
        })
    }

    /// Fetch from another address than the exchange's (mirrors, recorded servers).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn twse(timeout: Duration) -> Result<Self, DataError> {
        Self::new(DumpLayout::TWSE, timeout)
    }

    pub fn tpex(timeout: Duration) -> Result<Self, DataError> {
        Self::new(DumpLayout::TPEX, timeout)
    }
}

impl BulkSource for BulkDumpSource {
    fn id(&self) -> ProviderId {
        self.layout.provider
    }

    fn fetch_dump(&self) -> Result<BulkDump, DataError> {
        let body: HttpBody = http::send(self.layout.provider, self.client.get(&self.url))?;
        let filename = body.attachment_filename(self.layout.provider)?;
        let dump = BulkDump::parse(self.layout, &filename, &body.text)?;
        info!(
            provider = %self.layout.provider,
            date = %dump.date(),
            symbols = dump.len(),
            "fetched end-of-day dump"
        );
        Ok(dump)
    }
}
