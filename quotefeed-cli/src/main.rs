//! QuoteFeed CLI: fetch daily prices and emit ledger import lines.
//!
//! Commands:
//! - `us`: US equities from a paid time-series API
//! - `index`: market indices from the Nasdaq index API
//! - `tw`: Taiwan listings from the TWSE/TPEX dumps with MarketWatch fallback
//!
//! Lines go to `--output` (truncated on open) or stdout. Progress and logs
//! go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quotefeed_core::data::{RateLimiter, StderrProgress};
use quotefeed_core::{build_pipeline, FeedConfig, Market, UsProvider};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "quotefeed",
    about = "QuoteFeed CLI: daily prices as ledger import lines"
)]
struct Cli {
    /// TOML config file. Environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// US equities (symbols from SYMBOLS).
    Us {
        /// Time-series API to query.
        #[arg(long, value_enum, default_value_t = UsApi::AlphaVantage)]
        provider: UsApi,

        /// Output file. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Market indices (symbols from SYMBOLS_IDX).
    Index {
        /// Output file. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Taiwan listings (symbols from SYMBOLS_TW).
    Tw {
        /// Output file. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum UsApi {
    AlphaVantage,
    TwelveData,
}

impl From<UsApi> for UsProvider {
    fn from(api: UsApi) -> Self {
        match api {
            UsApi::AlphaVantage => UsProvider::AlphaVantage,
            UsApi::TwelveData => UsProvider::TwelveData,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let (market, us_provider, output) = match cli.command {
        Commands::Us { provider, output } => (Market::Us, provider.into(), output),
        Commands::Index { output } => (Market::Index, UsProvider::default(), output),
        Commands::Tw { output } => (Market::Taiwan, UsProvider::default(), output),
    };

    run(&config, market, us_provider, output)
}

fn load_config(path: Option<&std::path::Path>) -> Result<FeedConfig> {
    let base = match path {
        Some(path) => FeedConfig::from_file(path)?,
        None => FeedConfig::default(),
    };
    Ok(base.with_env(std::env::vars())?)
}

fn run(
    config: &FeedConfig,
    market: Market,
    us_provider: UsProvider,
    output: Option<PathBuf>,
) -> Result<()> {
    let symbols = config.symbols(market);
    if symbols.is_empty() {
        tracing::warn!(?market, "symbol list is empty, nothing to fetch");
    }

    let today = chrono::Local::now().date_naive();
    let limiter = Arc::new(RateLimiter::system());
    let pipeline = build_pipeline(config, market, us_provider, today, limiter)?;

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let summary = pipeline.run(&symbols, &mut out, &StderrProgress)?;
    for (provider, count) in &summary.by_provider {
        tracing::info!(%provider, symbols = count, "answered");
    }
    if let Some(path) = output {
        eprintln!("{} lines written to {}", summary.lines, path.display());
    }

    Ok(())
}
