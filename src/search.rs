//! Fan-out query orchestrator. Consults the in-memory cache, then the
//! persistent cache, then queries every provider supporting the sport in
//! parallel with an independent per-call timeout. Provider failures are
//! captured into the result's diagnostics channel, never propagated: a
//! partial result from healthy providers still serves.

use crate::cache::MemoryCache;
use crate::constants::{HEALTH_CACHE_TTL_SECS, PROVIDER_SEARCH_TIMEOUT_SECS};
use crate::error::{Result, ScannerError};
use crate::filters;
use crate::persistent::PersistentCacheService;
use crate::providers::ProviderRegistry;
use crate::types::{
    CourtSlot, ProviderFailure, ProviderHealth, ResultSource, SearchParams, SearchResult,
};
use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub struct SearchService {
    registry: Arc<ProviderRegistry>,
    memory_cache: MemoryCache<SearchResult>,
    health_cache: MemoryCache<ProviderHealth>,
    persistent: Option<Arc<PersistentCacheService>>,
    memory_ttl: Duration,
    provider_timeout: Duration,
}

impl SearchService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        memory_cache: MemoryCache<SearchResult>,
        persistent: Option<Arc<PersistentCacheService>>,
        memory_ttl: Duration,
    ) -> Self {
        // Bound memory from cached searches that are never read again.
        memory_cache.spawn_sweeper(Duration::from_secs(60));
        Self {
            registry,
            memory_cache,
            health_cache: MemoryCache::new(32),
            persistent,
            memory_ttl,
            provider_timeout: Duration::from_secs(PROVIDER_SEARCH_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    #[instrument(skip(self, params), fields(sport = %params.sport, location = %params.location, date = %params.date))]
    pub async fn search(&self, params: &SearchParams) -> SearchResult {
        let started = Instant::now();
        let key = params.generate_search_key();

        if let Some(mut hit) = self.memory_cache.get(&key) {
            debug!("Memory cache hit for {}", key);
            counter!("playscanner_search_cache_hits_total", "tier" => "memory").increment(1);
            hit.search_time_ms = started.elapsed().as_millis() as u64;
            return hit;
        }

        if let Some(persistent) = &self.persistent {
            if let Some(mut cached) = persistent.search(params).await {
                debug!("Persistent cache hit for {}", key);
                counter!("playscanner_search_cache_hits_total", "tier" => "persistent").increment(1);
                cached.search_time_ms = started.elapsed().as_millis() as u64;
                self.memory_cache.set(&key, cached.clone(), self.memory_ttl);
                return cached;
            }
        }

        counter!("playscanner_search_cache_misses_total").increment(1);
        let result = self.search_live(params, started).await;

        // Avoid caching a transient total failure as a false "no results".
        if !result.results.is_empty() || result.provider_errors.is_empty() {
            self.memory_cache.set(&key, result.clone(), self.memory_ttl);
        }
        histogram!("playscanner_search_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn search_live(&self, params: &SearchParams, started: Instant) -> SearchResult {
        let providers = self.registry.providers_for(params.sport);
        if providers.is_empty() {
            debug!("No providers registered for {}", params.sport);
            return SearchResult {
                search_time_ms: started.elapsed().as_millis() as u64,
                applied_filters: Some(params.clone()),
                ..SearchResult::empty()
            };
        }

        let calls = providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let params = params.clone();
            let timeout = self.provider_timeout;
            async move {
                let name = provider.name();
                let outcome =
                    tokio::time::timeout(timeout, provider.fetch_availability(&params)).await;
                match outcome {
                    Ok(Ok(slots)) => (name, Ok(slots)),
                    Ok(Err(e)) => (name, Err(e)),
                    // A timeout is accounted exactly like a thrown error.
                    Err(_) => (name, Err(ScannerError::Timeout(timeout.as_secs()))),
                }
            }
        });

        let mut all_slots = Vec::new();
        let mut contributing = Vec::new();
        let mut failures = Vec::new();
        for (name, outcome) in futures::future::join_all(calls).await {
            match outcome {
                Ok(slots) => {
                    if !slots.is_empty() {
                        contributing.push(name.to_string());
                    }
                    all_slots.extend(slots);
                }
                Err(e) => {
                    warn!("Provider {} failed during search: {}", name, e);
                    counter!("playscanner_provider_errors_total", "provider" => name).increment(1);
                    failures.push(ProviderFailure {
                        provider: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let results = merge_slots(all_slots);
        info!(
            "Live search returned {} slots from {} providers ({} failed)",
            results.len(),
            contributing.len(),
            failures.len()
        );
        SearchResult {
            total_results: results.len(),
            results,
            search_time_ms: started.elapsed().as_millis() as u64,
            providers: contributing,
            source: ResultSource::Live,
            cache_age_seconds: None,
            applied_filters: Some(params.clone()),
            provider_errors: failures,
        }
    }

    /// Per-provider health, memoized with a short TTL so repeated UI polls
    /// do not hammer upstreams.
    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        let mut out = Vec::new();
        for provider in self.registry.all() {
            let key = format!("health:{}", provider.name());
            if let Some(cached) = self.health_cache.get(&key) {
                out.push(cached);
                continue;
            }
            let health = ProviderHealth {
                provider: provider.name().to_string(),
                healthy: provider.health_check().await,
                checked_at: Utc::now(),
            };
            self.health_cache.set(
                &key,
                health.clone(),
                Duration::from_secs(HEALTH_CACHE_TTL_SECS),
            );
            out.push(health);
        }
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }

    /// Drop one cached search, or everything when no params are given.
    pub fn clear_cache(&self, params: Option<&SearchParams>) {
        match params {
            Some(p) => {
                self.memory_cache.delete(&p.generate_search_key());
            }
            None => self.memory_cache.clear(),
        }
    }

    pub fn available_providers(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Diagnostics: run one provider directly, bypassing every cache tier.
    pub async fn test_provider(&self, name: &str, params: &SearchParams) -> Result<Vec<CourtSlot>> {
        let provider = self.registry.get(name).ok_or_else(|| {
            ScannerError::Config(format!("Unknown provider: {name}"))
        })?;
        provider.fetch_availability(params).await
    }
}

/// Merge fan-out results: dedupe by (venue id, start time, price rounded to
/// whole currency units) keeping the cheaper slot on collision, then sort
/// by start time ascending with price as tie-break.
pub fn merge_slots(slots: Vec<CourtSlot>) -> Vec<CourtSlot> {
    let mut merged: Vec<CourtSlot> = Vec::with_capacity(slots.len());
    let mut index: HashMap<(String, i64, u32), usize> = HashMap::new();
    for slot in slots {
        let key = (
            slot.venue.id.clone(),
            slot.start.and_utc().timestamp(),
            slot.price / 100,
        );
        match index.get(&key) {
            Some(&i) => {
                if slot.price < merged[i].price {
                    merged[i] = slot;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(slot);
            }
        }
    }
    filters::sort_by_time_then_price(&mut merged);
    merged
}
