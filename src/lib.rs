pub mod cache;
pub mod collector;
pub mod config;
pub mod constants;
pub mod error;
pub mod filters;
pub mod logging;
pub mod metrics;
pub mod persistent;
pub mod providers;
pub mod scraping;
pub mod search;
pub mod types;
