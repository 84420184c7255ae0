//! Scraping-provider client and the fallback coordinator that keeps reads
//! answering through provider outages.

pub const CRATE_NAME: &str = "hotlist-provider";

mod client;
mod coordinator;
mod parse;

pub use client::{
    classify_reqwest_error, classify_status, BackoffPolicy, ProviderError, RetryDisposition,
    ScrapeClient, ScrapeConfig, MAX_BATCH_URLS,
};
pub use coordinator::FallbackCoordinator;
pub use parse::extract_item_id;
