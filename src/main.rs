use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use playscanner::cache::MemoryCache;
use playscanner::collector::plan::{ExecutionPolicy, WorkPlan};
use playscanner::collector::ProductionCollector;
use playscanner::config::Config;
use playscanner::constants;
use playscanner::persistent::PersistentCacheService;
use playscanner::providers::playtomic::PlaytomicProvider;
use playscanner::providers::ProviderRegistry;
use playscanner::search::SearchService;
use playscanner::types::{SearchParams, Sport};

#[derive(Parser)]
#[command(name = "playscanner")]
#[command(about = "Court and pitch availability aggregation engine")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full collection pass across the configured (city, date) matrix
    Collect {
        /// Sport to collect availability for
        #[arg(long, default_value = "padel")]
        sport: String,
        /// Cities to cover (comma-separated), overriding config
        #[arg(long)]
        cities: Option<String>,
        /// How many days ahead to plan
        #[arg(long)]
        days: Option<u32>,
    },
    /// Run a single search from the command line
    Search {
        #[arg(long, default_value = "padel")]
        sport: String,
        #[arg(long)]
        location: String,
        /// ISO date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Maximum price in minor units (pence)
        #[arg(long)]
        max_price: Option<u32>,
        /// Window start, HH:MM
        #[arg(long)]
        from: Option<String>,
        /// Window end, HH:MM
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        indoor: Option<bool>,
    },
    /// Probe provider and cache database health
    Health,
    /// Print persistent cache statistics and recent collections
    Stats,
    /// Delete expired persistent cache rows
    Cleanup,
    /// Run one provider directly, bypassing all caches
    TestProvider {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "padel")]
        sport: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        date: String,
    },
}

fn build_registry(config: &Config) -> Result<Arc<ProviderRegistry>> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(PlaytomicProvider::new(config.playtomic.clone())?));
    Ok(Arc::new(registry))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    Ok(NaiveTime::parse_from_str(s, "%H:%M")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    // Held until exit so buffered file logs are flushed.
    let _log_guard = playscanner::logging::init_logging();
    playscanner::metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load_or_default();
    let persistent = Arc::new(PersistentCacheService::open(&config.cache.database_path)?);

    match cli.command {
        Commands::Collect { sport, cities, days } => {
            println!("🔄 Running collection pass...");
            let sport = Sport::from_str(&sport)?;
            let cities: Vec<String> = cities
                .map(|list| list.split(',').map(|s| s.trim().to_lowercase()).collect())
                .unwrap_or_else(|| config.collector.cities.clone());
            let days = days.unwrap_or(config.collector.days_ahead);

            let registry = build_registry(&config)?;
            let provider = registry
                .get(constants::PLAYTOMIC_PROVIDER)
                .expect("playtomic registered at startup");
            let collector = ProductionCollector::new(
                provider,
                persistent.clone(),
                sport,
                Duration::from_secs(config.cache.persistent_ttl_secs),
            );
            let policy = ExecutionPolicy {
                max_concurrent: config.collector.max_concurrent_tasks,
                task_timeout: Duration::from_secs(config.collector.task_timeout_secs),
                max_retries: config.collector.max_retries,
                ..ExecutionPolicy::default()
            };
            let plan = WorkPlan::build(&cities, days, Utc::now().date_naive(), policy);

            let result = collector.run(&plan).await;
            println!("\n📊 Collection Run {}:", result.run_id);
            println!("   Tasks: {}", result.analysis.total_tasks);
            println!("   Succeeded: {}", result.analysis.succeeded);
            println!("   Failed: {}", result.analysis.failed);
            println!("   Success rate: {:.0}%", result.analysis.success_rate * 100.0);
            println!("   Slots collected: {}", result.analysis.total_slots);
            println!("   Venues collected: {}", result.analysis.total_venues);
            println!("   Avg task time: {}ms", result.analysis.avg_task_ms);
            if let Some(fallback) = &result.fallback {
                println!(
                    "   ⚠️  Degraded fallback for {}: {:?} ({} slots)",
                    fallback.city, fallback.status, fallback.slot_count
                );
            }
            if result.analysis.failed > 0 {
                println!("\n⚠️  Failed tasks:");
                for outcome in result.outcomes.iter().filter(|o| o.error.is_some()) {
                    println!(
                        "   - {} {}: {} (after {} attempts)",
                        outcome.city,
                        outcome.date,
                        outcome.error.as_deref().unwrap_or("unknown"),
                        outcome.attempts
                    );
                }
            }
        }
        Commands::Search {
            sport,
            location,
            date,
            max_price,
            from,
            to,
            indoor,
        } => {
            let mut params = SearchParams::new(Sport::from_str(&sport)?, location, parse_date(&date)?);
            params.max_price = max_price;
            params.start_time = from.as_deref().map(parse_time).transpose()?;
            params.end_time = to.as_deref().map(parse_time).transpose()?;
            params.indoor = indoor;

            let registry = build_registry(&config)?;
            let memory_cache = MemoryCache::new(config.cache.memory_max_entries);
            let service = SearchService::new(
                registry,
                memory_cache,
                Some(persistent.clone()),
                Duration::from_secs(config.cache.memory_ttl_secs),
            );
            let result = service.search(&params).await;
            println!(
                "🔎 {} results in {}ms (source: {:?})",
                result.total_results, result.search_time_ms, result.source
            );
            for slot in &result.results {
                println!(
                    "   {} {}–{}  {} {:.2} {}  {}",
                    slot.start.date(),
                    slot.start.time().format("%H:%M"),
                    slot.end.time().format("%H:%M"),
                    slot.venue.name,
                    slot.price as f64 / 100.0,
                    slot.currency,
                    slot.booking_url
                );
            }
            if !result.provider_errors.is_empty() {
                println!("\n⚠️  Provider errors:");
                for failure in &result.provider_errors {
                    println!("   - {}: {}", failure.provider, failure.message);
                }
            }
        }
        Commands::Health => {
            let registry = build_registry(&config)?;
            let service = SearchService::new(
                registry,
                MemoryCache::new(8),
                Some(persistent.clone()),
                Duration::from_secs(config.cache.memory_ttl_secs),
            );
            match persistent.health_check().await {
                Ok(_) => println!("✅ Cache database reachable"),
                Err(e) => {
                    error!("Cache database health check failed: {}", e);
                    println!("❌ Cache database unreachable: {e}");
                }
            }
            for health in service.provider_health().await {
                let icon = if health.healthy { "✅" } else { "❌" };
                println!("{} Provider {} (checked {})", icon, health.provider, health.checked_at);
            }
        }
        Commands::Stats => {
            let stats = persistent.stats().await?;
            println!("📊 Persistent cache:");
            println!("   Entries: {} ({} valid, {} expired)", stats.total_entries, stats.valid_entries, stats.expired_entries);
            println!("   Cached slots: {}", stats.total_slots);
            println!("   Venues: {}", stats.venue_count);
            println!("   Collections logged: {}", stats.collection_count);
            println!("   Success rate (24h): {:.0}%", persistent.success_rate(24).await * 100.0);
            println!("\n🕓 Recent collections:");
            for entry in persistent.recent_collections(10).await {
                println!(
                    "   {} {} {} [{:?}] {} slots in {}ms",
                    entry.created_at, entry.city, entry.date, entry.status, entry.slot_count, entry.duration_ms
                );
            }
        }
        Commands::Cleanup => {
            let removed = persistent.cleanup().await?;
            println!("🧹 Removed {removed} expired cache rows");
        }
        Commands::TestProvider {
            name,
            sport,
            location,
            date,
        } => {
            let params = SearchParams::new(Sport::from_str(&sport)?, location, parse_date(&date)?);
            let registry = build_registry(&config)?;
            let service = SearchService::new(
                registry,
                MemoryCache::new(8),
                None,
                Duration::from_secs(60),
            );
            match service.test_provider(&name, &params).await {
                Ok(slots) => println!("✅ Provider {name} returned {} slots", slots.len()),
                Err(e) => {
                    error!("Provider test failed: {}", e);
                    println!("❌ Provider {name} failed: {e}");
                }
            }
        }
    }
    Ok(())
}
