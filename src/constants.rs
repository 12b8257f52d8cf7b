/// Provider name constants to ensure consistency across the codebase.
/// The registry, collection log, and slot ids all use these strings.

pub const PLAYTOMIC_PROVIDER: &str = "playtomic";

/// Directory and file prefix for the rolling JSON log output.
pub const LOG_DIRECTORY: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "playscanner.log";

/// Tracing filter applied when RUST_LOG says nothing about this crate.
pub const DEFAULT_LOG_DIRECTIVE: &str = "playscanner=info";

/// Default TTL for persistent availability cache rows.
pub const PERSISTENT_CACHE_TTL_SECS: u64 = 6 * 60 * 60;

/// Default TTL for in-memory search results.
pub const MEMORY_CACHE_TTL_SECS: u64 = 5 * 60;

/// Default TTL for memoized provider health probes.
pub const HEALTH_CACHE_TTL_SECS: u64 = 60;

/// Per-provider call timeout inside a search fan-out.
pub const PROVIDER_SEARCH_TIMEOUT_SECS: u64 = 25;

/// Per-task timeout inside a collection run.
pub const COLLECTOR_TASK_TIMEOUT_SECS: u64 = 45;

/// Cities the production collector covers by default.
pub const DEFAULT_COLLECTOR_CITIES: &[&str] = &["london", "manchester", "birmingham", "leeds", "bristol"];

/// Get all provider names known to the registry builder.
pub fn get_supported_providers() -> Vec<&'static str> {
    vec![PLAYTOMIC_PROVIDER]
}
