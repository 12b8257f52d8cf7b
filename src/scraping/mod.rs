pub mod client;
pub mod rate_limiter;

pub use client::ScrapingClient;
pub use rate_limiter::RateLimiter;
