//! QuoteFeed Core: daily price acquisition and ledger export.
//!
//! This crate pulls daily security prices from several incompatible
//! providers and emits one fixed-format import line per row:
//! - Domain types (canonical rows, date windows, symbol lists)
//! - Provider adapters (time-series APIs, index API, exchange dumps, CSV fallback)
//! - Per-provider rate limiting with quota and politeness policies
//! - Ordered fallback resolution across providers
//! - The ledger line formatter

pub mod config;
pub mod data;
pub mod domain;
pub mod export;
pub mod pipeline;

pub use config::FeedConfig;
pub use data::{DataError, ProviderId};
pub use domain::{CanonicalRow, DateRange, SymbolList};
pub use export::ExportFormat;
pub use pipeline::{build_pipeline, Market, Pipeline, RunSummary, UsProvider};
