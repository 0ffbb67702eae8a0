//! Symbol resolution and the run loop.

pub mod markets;
pub mod resolver;
pub mod run;

pub use markets::{build_pipeline, Market, UsProvider};
pub use resolver::{DumpResolver, FeedResolver, Resolution, Resolver, RetryPolicy};
pub use run::{Pipeline, Resolved, RunSummary};
