use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use playscanner::collector::circuit::CircuitBreaker;
use playscanner::collector::plan::{ExecutionPolicy, TaskStatus, WorkPlan};
use playscanner::collector::ProductionCollector;
use playscanner::error::{Result as ScannerResult, ScannerError};
use playscanner::persistent::PersistentCacheService;
use playscanner::providers::ProviderAdapter;
use playscanner::types::{
    CourtSlot, SearchParams, Sport, SportMeta, Venue, VenueLocation,
};

/// Provider scripted to fail a fixed number of times before succeeding.
struct ScriptedProvider {
    calls: AtomicU32,
    failures_before_success: u32,
    slots_per_success: usize,
}

impl ScriptedProvider {
    fn new(failures_before_success: u32, slots_per_success: usize) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures_before_success,
            slots_per_success,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn make_slot(&self, params: &SearchParams, index: usize) -> CourtSlot {
        let start = params.date.and_hms_opt(10 + index as u32, 0, 0).unwrap();
        let venue = Venue {
            id: format!("venue-{index}"),
            name: format!("Scripted Venue {index}"),
            provider: "scripted".to_string(),
            location: VenueLocation {
                address: "1 Mock Street".to_string(),
                city: params.location.clone(),
                postcode: None,
                lat: 51.5,
                lng: -0.1,
            },
            amenities: vec![],
            images: vec![],
            rating: None,
            phone: None,
            website: None,
        };
        CourtSlot {
            id: CourtSlot::derive_id("scripted", &venue.id, start),
            sport: params.sport,
            provider: "scripted".to_string(),
            venue,
            start,
            end: start + chrono::Duration::minutes(60),
            duration_minutes: 60,
            price: 3000 + index as u32 * 500,
            currency: "GBP".to_string(),
            booking_url: "https://example.com".to_string(),
            available_count: 1,
            indoor: false,
            lights: false,
            surface: None,
            meta: SportMeta::Padel {
                court_type: None,
                level_range: None,
                double_court: false,
            },
            collected_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }
    fn sports(&self) -> &[Sport] {
        &[Sport::Padel]
    }
    fn regions(&self) -> &[&'static str] {
        &["london"]
    }
    fn requests_per_second(&self) -> usize {
        100
    }
    async fn fetch_availability(&self, params: &SearchParams) -> ScannerResult<Vec<CourtSlot>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            return Err(ScannerError::scraping("scripted upstream failure", Some(503)));
        }
        Ok((0..self.slots_per_success)
            .map(|i| self.make_slot(params, i))
            .collect())
    }
    async fn venue_raw_payload(&self, venue_id: &str) -> Option<serde_json::Value> {
        Some(serde_json::json!({"scripted_id": venue_id}))
    }
    async fn health_check(&self) -> bool {
        true
    }
    fn booking_url(&self, venue_id: &str, date: NaiveDate) -> String {
        format!("https://example.com/{venue_id}/{date}")
    }
}

fn fast_policy() -> ExecutionPolicy {
    ExecutionPolicy {
        max_concurrent: 1,
        task_timeout: Duration::from_secs(5),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(50),
        retry_max_delay: Duration::from_millis(400),
    }
}

fn single_task_plan() -> WorkPlan {
    WorkPlan::build(
        &["london".to_string()],
        1,
        NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
        fast_policy(),
    )
}

#[tokio::test]
async fn task_succeeding_on_third_attempt_reports_three_attempts() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(2, 3));
    let persistent = Arc::new(PersistentCacheService::open_in_memory()?);
    let collector = ProductionCollector::new(
        provider.clone(),
        persistent.clone(),
        Sport::Padel,
        Duration::from_secs(3600),
    );

    let plan = single_task_plan();
    let started = Instant::now();
    let result = collector.run(&plan).await;

    assert_eq!(result.analysis.succeeded, 1);
    let outcome = &result.outcomes[0];
    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.slot_count, 3);
    assert_eq!(provider.calls(), 3);
    // Two backoffs happened: 50ms then 100ms.
    assert!(started.elapsed() >= Duration::from_millis(150));

    // The collection landed in the persistent cache.
    let date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
    let cached = persistent.get_cached("london", date, Sport::Padel).await.unwrap();
    assert_eq!(cached.slots.len(), 3);
    Ok(())
}

#[tokio::test]
async fn successful_run_persists_venues_and_raw_payloads() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(0, 2));
    let persistent = Arc::new(PersistentCacheService::open_in_memory()?);
    let collector = ProductionCollector::new(
        provider,
        persistent.clone(),
        Sport::Padel,
        Duration::from_secs(3600),
    );

    let result = collector.run(&single_task_plan()).await;
    assert_eq!(result.analysis.total_venues, 2);

    let stats = persistent.stats().await?;
    assert_eq!(stats.venue_count, 2);
    let raw = persistent.venue_raw("scripted", "venue-0").await.unwrap();
    assert_eq!(raw["scripted_id"], "venue-0");
    Ok(())
}

#[tokio::test]
async fn open_circuit_rejects_without_calling_the_provider() -> Result<()> {
    // Never succeeds; 3 tasks x 3 attempts = 9 potential calls, but the
    // breaker opens after 5 consecutive failures and the 60s cooldown far
    // exceeds the retry backoff, so later attempts are rejected fast.
    let provider = Arc::new(ScriptedProvider::new(u32::MAX, 0));
    let persistent = Arc::new(PersistentCacheService::open_in_memory()?);
    let collector = ProductionCollector::new(
        provider.clone(),
        persistent.clone(),
        Sport::Padel,
        Duration::from_secs(3600),
    )
    .with_breaker(CircuitBreaker::new(5, Duration::from_secs(60)));

    let plan = WorkPlan::build(
        &["london".to_string(), "leeds".to_string(), "bristol".to_string()],
        1,
        NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
        fast_policy(),
    );
    let result = collector.run(&plan).await;

    assert_eq!(result.analysis.succeeded, 0);
    assert_eq!(result.analysis.failed, 3);
    // Five real calls reach the threshold, later attempts are rejected
    // without I/O, and the degradation fallback issues one more call
    // because it bypasses the breaker.
    assert_eq!(provider.calls(), 6);
    assert_eq!(result.metrics.circuit_rejections, 4);
    assert!(result.fallback.is_some());
    Ok(())
}

#[tokio::test]
async fn systemic_failure_triggers_graceful_degradation() -> Result<()> {
    // Fails 3 scheduled attempts, then succeeds: the run's only task is
    // marked failed but the fallback fetch recovers data.
    let provider = Arc::new(ScriptedProvider::new(3, 2));
    let persistent = Arc::new(PersistentCacheService::open_in_memory()?);
    let collector = ProductionCollector::new(
        provider,
        persistent.clone(),
        Sport::Padel,
        Duration::from_secs(3600),
    );

    let result = collector.run(&single_task_plan()).await;
    assert_eq!(result.analysis.succeeded, 0);
    let fallback = result.fallback.expect("degraded fallback ran");
    assert_eq!(fallback.status, TaskStatus::Completed);
    assert_eq!(fallback.slot_count, 2);

    let date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
    assert!(persistent.get_cached("london", date, Sport::Padel).await.is_some());
    Ok(())
}

#[tokio::test]
async fn run_logs_every_attempt_to_the_collection_log() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(1, 1));
    let persistent = Arc::new(PersistentCacheService::open_in_memory()?);
    let collector = ProductionCollector::new(
        provider,
        persistent.clone(),
        Sport::Padel,
        Duration::from_secs(3600),
    );

    collector.run(&single_task_plan()).await;
    let recent = persistent.recent_collections(10).await;
    // One failure entry plus one success entry.
    assert_eq!(recent.len(), 2);
    assert!((persistent.success_rate(1).await - 0.5).abs() < f64::EPSILON);
    Ok(())
}
