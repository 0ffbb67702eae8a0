//! End-to-end pipeline tests using recorded provider bodies and test-double
//! providers. No network access.

use chrono::NaiveDate;
use quotefeed_core::data::{
    AlphaVantageProvider, BulkDump, BulkSource, DataError, DumpLayout, FetchProgress,
    ManualClock, MarketWatchProvider, NasdaqIndexProvider, ProviderId, QuoteProvider,
    RateLimiter, RatePolicy, VolumeScale,
};
use quotefeed_core::domain::{CanonicalRow, DateRange, SymbolList};
use quotefeed_core::pipeline::markets::{single_source, with_dumps};
use quotefeed_core::pipeline::RetryPolicy;
use quotefeed_core::{ExportFormat, Market, Pipeline};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TWSE_CSV: &str = include_str!("fixtures/twse_stock_day_all.csv");
const TPEX_CSV: &str = include_str!("fixtures/tpex_daily.csv");
const MARKETWATCH_CSV: &str = include_str!("fixtures/marketwatch_00773b.csv");
const ALPHA_VANTAGE_JSON: &str = include_str!("fixtures/alpha_vantage_msft.json");
const NASDAQ_JSON: &str = include_str!("fixtures/nasdaq_comp.json");

// ── Test doubles ─────────────────────────────────────────────────────

/// Records progress callbacks so tests can check processing order.
#[derive(Default)]
struct Recorder {
    started: Mutex<Vec<String>>,
    cooldowns: Mutex<Vec<Duration>>,
}

impl FetchProgress for Recorder {
    fn on_start(&self, symbol: &str, _index: usize, _total: usize) {
        self.started.lock().unwrap().push(symbol.to_string());
    }

    fn on_cooldown(&self, _provider: ProviderId, _symbol: &str, wait: Duration) {
        self.cooldowns.lock().unwrap().push(wait);
    }

    fn on_complete(&self, _symbol: &str, _provider: ProviderId, _rows: usize) {}
}

/// A dump served from a fixture with a given attachment filename.
struct FixtureDump {
    layout: DumpLayout,
    filename: &'static str,
    body: &'static str,
}

impl BulkSource for FixtureDump {
    fn id(&self) -> ProviderId {
        self.layout.provider
    }

    fn fetch_dump(&self) -> Result<BulkDump, DataError> {
        BulkDump::parse(self.layout, self.filename, self.body)
    }
}

/// Per-symbol provider scripted from a closure; logs every symbol asked.
struct Scripted<F> {
    id: ProviderId,
    scale: VolumeScale,
    asked: Arc<Mutex<Vec<String>>>,
    answer: F,
}

impl<F> Scripted<F>
where
    F: Fn(&str, usize) -> Result<Vec<CanonicalRow>, DataError>,
{
    fn new(id: ProviderId, scale: VolumeScale, answer: F) -> (Self, Arc<Mutex<Vec<String>>>) {
        let asked = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                id,
                scale,
                asked: asked.clone(),
                answer,
            },
            asked,
        )
    }
}

impl<F> QuoteProvider for Scripted<F>
where
    F: Fn(&str, usize) -> Result<Vec<CanonicalRow>, DataError>,
{
    fn id(&self) -> ProviderId {
        self.id
    }

    fn volume_scale(&self) -> VolumeScale {
        self.scale
    }

    fn fetch(&self, symbol: &str, _range: &DateRange) -> Result<Vec<CanonicalRow>, DataError> {
        let call = {
            let mut asked = self.asked.lock().unwrap();
            asked.push(symbol.to_string());
            asked.len()
        };
        (self.answer)(symbol, call)
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()
}

fn range() -> DateRange {
    DateRange::trailing_days(today(), 30)
}

fn manual_limiter() -> (Arc<ManualClock>, Arc<RateLimiter>) {
    let clock = Arc::new(ManualClock::new());
    let limiter = Arc::new(RateLimiter::new(clock.clone()));
    (clock, limiter)
}

fn twse() -> FixtureDump {
    FixtureDump {
        layout: DumpLayout::TWSE,
        filename: "STOCK_DAY_ALL_20240312.csv",
        body: TWSE_CSV,
    }
}

fn tpex() -> FixtureDump {
    FixtureDump {
        layout: DumpLayout::TPEX,
        filename: "RSTA3104_1130312.csv",
        body: TPEX_CSV,
    }
}

/// TWSE-first chain over the fixture dumps, like the live Taiwan run.
fn taiwan_pipeline(
    listed: &FixtureDump,
    fallback: Box<dyn QuoteProvider>,
    limiter: Arc<RateLimiter>,
) -> Result<Pipeline, DataError> {
    let otc = tpex();
    let dumps: [&dyn BulkSource; 2] = [listed, &otc];
    with_dumps(
        range(),
        Market::Taiwan.export_format(),
        &dumps,
        fallback,
        limiter,
        RetryPolicy::default(),
    )
}

fn marketwatch_fixture(
    symbol: &str,
    _call: usize,
) -> Result<Vec<CanonicalRow>, DataError> {
    MarketWatchProvider::parse_response(symbol, MARKETWATCH_CSV)
}

fn output_lines(buf: Vec<u8>) -> Vec<String> {
    String::from_utf8(buf)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

// ── Taiwan: dumps with fallback ──────────────────────────────────────

#[test]
fn twse_hit_yields_single_line_with_lots() {
    let (_clock, limiter) = manual_limiter();
    let (fallback, asked) =
        Scripted::new(ProviderId::MarketWatch, VolumeScale::PerHundred, marketwatch_fixture);
    let pipeline = taiwan_pipeline(&twse(), Box::new(fallback), limiter).unwrap();

    let mut out = Vec::new();
    let summary = pipeline
        .run(&SymbolList::parse("2330"), &mut out, &Recorder::default())
        .unwrap();

    assert_eq!(
        output_lines(out),
        vec!["2330tw, 600, ---, 2024/03/12, ---, 610, 590, 123456.78, *"]
    );
    assert_eq!(summary.by_provider.get(&ProviderId::Twse), Some(&1));
    assert!(asked.lock().unwrap().is_empty(), "fallback must not be consulted");
}

#[test]
fn tpex_is_consulted_only_after_twse_misses() {
    let (_clock, limiter) = manual_limiter();
    let (fallback, asked) =
        Scripted::new(ProviderId::MarketWatch, VolumeScale::PerHundred, marketwatch_fixture);
    let pipeline = taiwan_pipeline(&twse(), Box::new(fallback), limiter).unwrap();

    let mut out = Vec::new();
    let summary = pipeline
        .run(&SymbolList::parse("6488\n2317"), &mut out, &Recorder::default())
        .unwrap();

    assert_eq!(
        output_lines(out),
        vec![
            "2317tw, 103.00, ---, 2024/03/12, ---, 104.00, 102.50, 302110, *",
            "6488tw, 520.00, ---, 2024/03/12, ---, 522.00, 514.00, 12340, *",
        ]
    );
    assert_eq!(summary.by_provider.get(&ProviderId::Twse), Some(&1));
    assert_eq!(summary.by_provider.get(&ProviderId::Tpex), Some(&1));
    assert!(asked.lock().unwrap().is_empty());
}

#[test]
fn symbol_missing_from_both_dumps_uses_fallback_series() {
    let (clock, limiter) = manual_limiter();
    limiter.configure(ProviderId::MarketWatch, RatePolicy::POLITE);
    let (fallback, asked) =
        Scripted::new(ProviderId::MarketWatch, VolumeScale::PerHundred, marketwatch_fixture);
    let pipeline = taiwan_pipeline(&twse(), Box::new(fallback), limiter).unwrap();

    let mut out = Vec::new();
    let summary = pipeline
        .run(&SymbolList::parse("00773B"), &mut out, &Recorder::default())
        .unwrap();

    assert_eq!(
        output_lines(out),
        vec![
            "00773Btw, 15.30, ---, 2024/03/12, ---, 15.35, 15.10, 12345.67, *",
            "00773Btw, 15.15, ---, 2024/03/11, ---, 15.25, 14.95, 9870, *",
            "00773Btw, 15.00, ---, 2024/03/08, ---, 15.05, 14.85, 0, *",
        ]
    );
    assert_eq!(summary.lines, 3);
    assert_eq!(*asked.lock().unwrap(), vec!["00773B".to_string()]);
    // Politeness pause after the scraped call.
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
}

#[test]
fn failed_dump_fetch_aborts_before_any_symbol() {
    let (_clock, limiter) = manual_limiter();
    let (fallback, _asked) =
        Scripted::new(ProviderId::MarketWatch, VolumeScale::PerHundred, marketwatch_fixture);
    let undated = FixtureDump {
        layout: DumpLayout::TWSE,
        filename: "STOCK_DAY_ALL.csv",
        body: TWSE_CSV,
    };

    let result = taiwan_pipeline(&undated, Box::new(fallback), limiter);
    assert!(matches!(result, Err(DataError::MissingMetadata { .. })));
}

#[test]
fn each_symbol_is_answered_by_exactly_one_provider() {
    let (_clock, limiter) = manual_limiter();
    let (fallback, asked) =
        Scripted::new(ProviderId::MarketWatch, VolumeScale::PerHundred, marketwatch_fixture);
    let pipeline = taiwan_pipeline(&twse(), Box::new(fallback), limiter).unwrap();

    let symbols = SymbolList::parse("2330\n0050\n6488\n8069\n00773B\n00679B");
    let mut out = Vec::new();
    let summary = pipeline.run(&symbols, &mut out, &Recorder::default()).unwrap();

    // Two dump hits each from TWSE and TPEX, three fallback rows each for two symbols.
    assert_eq!(summary.symbols, 6);
    assert_eq!(summary.lines, 2 + 2 + 3 * 2);
    assert_eq!(output_lines(out).len(), summary.lines);
    assert_eq!(
        *asked.lock().unwrap(),
        vec!["00679B".to_string(), "00773B".to_string()]
    );
    assert_eq!(summary.by_provider.values().sum::<usize>(), 6);
}

// ── Single source ────────────────────────────────────────────────────

#[test]
fn symbols_are_processed_sorted_and_once() {
    let (_clock, limiter) = manual_limiter();
    let (provider, asked) = Scripted::new(
        ProviderId::AlphaVantage,
        VolumeScale::PerHundred,
        |symbol: &str, _call: usize| AlphaVantageProvider::parse_response(symbol, &range(), ALPHA_VANTAGE_JSON),
    );
    let pipeline = single_source(
        range(),
        ExportFormat::new(),
        Box::new(provider),
        limiter,
        RetryPolicy::default(),
    );

    let progress = Recorder::default();
    let mut out = Vec::new();
    pipeline
        .run(
            &SymbolList::parse("AAPL\n#comment\n\nAAPL\nMSFT"),
            &mut out,
            &progress,
        )
        .unwrap();

    let expected = vec!["AAPL".to_string(), "MSFT".to_string()];
    assert_eq!(*progress.started.lock().unwrap(), expected);
    assert_eq!(*asked.lock().unwrap(), expected);
}

#[test]
fn alpha_vantage_window_and_order_flow_to_output() {
    let (_clock, limiter) = manual_limiter();
    let (provider, _asked) = Scripted::new(
        ProviderId::AlphaVantage,
        VolumeScale::PerHundred,
        |symbol: &str, _call: usize| AlphaVantageProvider::parse_response(symbol, &range(), ALPHA_VANTAGE_JSON),
    );
    let pipeline = single_source(
        range(),
        ExportFormat::new(),
        Box::new(provider),
        limiter,
        RetryPolicy::default(),
    );

    let mut out = Vec::new();
    pipeline
        .run(&SymbolList::parse("MSFT"), &mut out, &Recorder::default())
        .unwrap();

    assert_eq!(
        output_lines(out),
        vec![
            "MSFT, 415.2800, ---, 2024/03/12, ---, 415.5700, 406.7900, 251547, *",
            "MSFT, 404.5200, ---, 2024/03/11, ---, 405.6800, 401.2600, 161208, *",
            "MSFT, 406.2200, ---, 2024/03/08, ---, 410.4200, 404.3300, 181001, *",
        ]
    );
}

#[test]
fn index_lines_keep_volume_unscaled() {
    let (_clock, limiter) = manual_limiter();
    let (provider, _asked) = Scripted::new(
        ProviderId::NasdaqIndex,
        VolumeScale::AsReported,
        |symbol: &str, _call: usize| NasdaqIndexProvider::parse_response(symbol, NASDAQ_JSON),
    );
    let pipeline = single_source(
        range(),
        Market::Index.export_format(),
        Box::new(provider),
        limiter,
        RetryPolicy::default(),
    );

    let mut out = Vec::new();
    pipeline
        .run(&SymbolList::parse("COMP"), &mut out, &Recorder::default())
        .unwrap();

    assert_eq!(
        output_lines(out),
        vec![
            "COMP, 16265.64, ---, 2024/03/12, ---, 16275.69, 16038.12, 0, *",
            "COMP, 16019.27, ---, 2024/03/11, ---, 16085.25, 15960.10, 0, *",
        ]
    );
}

#[test]
fn http_503_aborts_without_writing_later_symbols() {
    let (_clock, limiter) = manual_limiter();
    let (provider, asked) = Scripted::new(
        ProviderId::NasdaqIndex,
        VolumeScale::AsReported,
        |symbol: &str, _call: usize| {
            if symbol == "INDU" {
                return Err(DataError::HttpStatus {
                    provider: ProviderId::NasdaqIndex,
                    status: 503,
                    body: "Service Unavailable".into(),
                });
            }
            NasdaqIndexProvider::parse_response(symbol, NASDAQ_JSON)
        },
    );
    let pipeline = single_source(
        range(),
        ExportFormat::new(),
        Box::new(provider),
        limiter,
        RetryPolicy::default(),
    );

    let mut out = Vec::new();
    let result = pipeline.run(&SymbolList::parse("COMP\nINDU\nNDX"), &mut out, &Recorder::default());

    assert!(matches!(
        result,
        Err(DataError::HttpStatus { status: 503, .. })
    ));
    let lines = output_lines(out);
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.starts_with("COMP, ")));
    assert_eq!(
        *asked.lock().unwrap(),
        vec!["COMP".to_string(), "INDU".to_string()]
    );
}

#[test]
fn rate_limited_run_matches_immediate_run() {
    let answer = |symbol: &str| AlphaVantageProvider::parse_response(symbol, &range(), ALPHA_VANTAGE_JSON);

    let (fast_clock, fast_limiter) = manual_limiter();
    let (fast, _) = Scripted::new(
        ProviderId::AlphaVantage,
        VolumeScale::PerHundred,
        move |symbol: &str, _call: usize| answer(symbol),
    );

    let (slow_clock, slow_limiter) = manual_limiter();
    let (slow, _) = Scripted::new(
        ProviderId::AlphaVantage,
        VolumeScale::PerHundred,
        move |symbol: &str, call: usize| {
            // Quota message on the second call only.
            if call == 2 {
                return Err(DataError::RateLimited {
                    provider: ProviderId::AlphaVantage,
                    retry_after: None,
                });
            }
            answer(symbol)
        },
    );

    let symbols = SymbolList::parse("AAPL\nIBM\nMSFT");
    let run = |provider: Box<dyn QuoteProvider>, limiter: Arc<RateLimiter>| {
        let pipeline = single_source(
            range(),
            ExportFormat::new(),
            provider,
            limiter,
            RetryPolicy::default(),
        );
        let progress = Recorder::default();
        let mut out = Vec::new();
        pipeline.run(&symbols, &mut out, &progress).unwrap();
        (output_lines(out), progress.cooldowns.into_inner().unwrap())
    };

    let (fast_lines, fast_cooldowns) = run(Box::new(fast), fast_limiter);
    let (slow_lines, slow_cooldowns) = run(Box::new(slow), slow_limiter);

    assert_eq!(fast_lines, slow_lines);
    assert!(fast_cooldowns.is_empty());
    assert_eq!(slow_cooldowns, vec![Duration::from_secs(60)]);
    assert_eq!(fast_clock.total_slept(), Duration::ZERO);
    assert_eq!(slow_clock.total_slept(), Duration::from_secs(60));
}

#[test]
fn client_side_quota_spreads_calls_over_windows() {
    let (clock, limiter) = manual_limiter();
    limiter.configure(ProviderId::AlphaVantage, RatePolicy::ALPHA_VANTAGE);
    let (provider, asked) = Scripted::new(
        ProviderId::AlphaVantage,
        VolumeScale::PerHundred,
        |symbol: &str, _call: usize| AlphaVantageProvider::parse_response(symbol, &range(), ALPHA_VANTAGE_JSON),
    );
    let pipeline = single_source(
        range(),
        ExportFormat::new(),
        Box::new(provider),
        limiter,
        RetryPolicy::default(),
    );

    let symbols: SymbolList = ["A", "B", "C", "D", "E", "F", "G"].into_iter().collect();
    let mut out = Vec::new();
    let summary = pipeline.run(&symbols, &mut out, &Recorder::default()).unwrap();

    assert_eq!(summary.symbols, 7);
    assert_eq!(asked.lock().unwrap().len(), 7);
    // Calls 1-5 go straight through; call 6 waits out the first window.
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
}

#[test]
fn malformed_record_is_fatal_for_the_run() {
    let (_clock, limiter) = manual_limiter();
    let (provider, _asked) = Scripted::new(
        ProviderId::MarketWatch,
        VolumeScale::PerHundred,
        |symbol: &str, _call: usize| {
            MarketWatchProvider::parse_response(
                symbol,
                "Date,Open,High,Low,Close,Volume\n03/12/2024,1,1,1,N/A,100\n",
            )
        },
    );
    let pipeline = single_source(
        range(),
        ExportFormat::new(),
        Box::new(provider),
        limiter,
        RetryPolicy::default(),
    );

    let mut out = Vec::new();
    let result = pipeline.run(&SymbolList::parse("00773B"), &mut out, &Recorder::default());
    assert!(matches!(result, Err(DataError::MalformedRecord { .. })));
    assert!(out.is_empty());
}
