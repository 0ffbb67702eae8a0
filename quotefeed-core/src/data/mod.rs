//! Provider adapters and the plumbing they share.

pub mod alpha_vantage;
pub mod bulk_dump;
pub mod http;
pub mod market_watch;
pub mod nasdaq;
pub mod normalize;
pub mod provider;
pub mod rate_limit;
pub mod twelve_data;

pub use alpha_vantage::AlphaVantageProvider;
pub use bulk_dump::{BulkDump, BulkDumpSource, DumpLayout};
pub use market_watch::MarketWatchProvider;
pub use nasdaq::NasdaqIndexProvider;
pub use provider::{
    BulkSource, DataError, FetchProgress, ProviderId, QuoteProvider, StderrProgress, VolumeScale,
};
pub use rate_limit::{Clock, ManualClock, RateLimiter, RatePolicy, SystemClock};
pub use twelve_data::TwelveDataProvider;
