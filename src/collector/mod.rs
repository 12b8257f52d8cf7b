//! Scheduled collection: proactively populates the persistent cache for a
//! matrix of (city, date) pairs under bounded concurrency, with retry,
//! backoff, and a circuit breaker isolating a failing upstream.

pub mod circuit;
pub mod plan;

use crate::error::ScannerError;
use crate::persistent::{CollectionLogEntry, CollectionStatus, PersistentCacheService};
use crate::providers::ProviderAdapter;
use crate::types::{SearchParams, Sport, Venue};
use chrono::{DateTime, NaiveDate, Utc};
use circuit::CircuitBreaker;
use metrics::{counter, histogram};
use plan::{TaskStatus, WorkPlan};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Counters accumulated across one collector's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorMetrics {
    pub tasks_attempted: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub retries: u64,
    pub circuit_rejections: u64,
    pub slots_collected: u64,
    pub venues_collected: u64,
}

/// Outcome of one task after all its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub city: String,
    pub date: NaiveDate,
    pub status: TaskStatus,
    pub attempts: u32,
    pub slot_count: u32,
    pub venue_count: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate view over a run's outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAnalysis {
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub total_slots: u64,
    pub total_venues: u64,
    pub avg_task_ms: u64,
}

/// Structured result of one full collection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRunResult {
    pub run_id: Uuid,
    pub provider: String,
    pub sport: Sport,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub provider_healthy_at_start: bool,
    pub outcomes: Vec<TaskOutcome>,
    pub analysis: RunAnalysis,
    pub metrics: CollectorMetrics,
    /// Single-city fallback attempted after a systemic failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<TaskOutcome>,
}

pub struct ProductionCollector {
    provider: Arc<dyn ProviderAdapter>,
    persistent: Arc<PersistentCacheService>,
    breaker: CircuitBreaker,
    metrics: Mutex<CollectorMetrics>,
    sport: Sport,
    cache_ttl: Duration,
}

impl ProductionCollector {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        persistent: Arc<PersistentCacheService>,
        sport: Sport,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            persistent,
            breaker: CircuitBreaker::default_policy(),
            metrics: Mutex::new(CollectorMetrics::default()),
            sport,
            cache_ttl,
        }
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn metrics_snapshot(&self) -> CollectorMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Execute one full collection pass over the plan.
    #[instrument(skip(self, plan), fields(provider = %self.provider.name(), sport = %self.sport, tasks = plan.tasks.len()))]
    pub async fn run(&self, plan: &WorkPlan) -> CollectionRunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let healthy = self.provider.health_check().await;
        if !healthy {
            warn!("Provider {} failed its health probe; proceeding under circuit protection", self.provider.name());
        }

        let semaphore = Arc::new(Semaphore::new(plan.policy.max_concurrent.max(1)));
        let task_futures = plan.tasks.iter().map(|task| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.execute_task(&task.city, task.date, plan).await
            }
        });
        let outcomes: Vec<TaskOutcome> = futures::future::join_all(task_futures).await;

        let analysis = analyze(&outcomes);
        counter!("playscanner_collector_runs_total").increment(1);
        histogram!("playscanner_collector_run_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        // Systemic failure: every task exhausted its retries. Attempt a
        // single-city, single-date fetch so the cache is not left empty.
        let fallback = if analysis.total_tasks > 0 && analysis.succeeded == 0 {
            warn!("All {} tasks failed; attempting graceful-degradation fetch", analysis.total_tasks);
            self.graceful_degradation(plan).await
        } else {
            None
        };

        let result = CollectionRunResult {
            run_id,
            provider: self.provider.name().to_string(),
            sport: self.sport,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            provider_healthy_at_start: healthy,
            outcomes,
            analysis,
            metrics: self.metrics_snapshot(),
            fallback,
        };
        info!(
            "Collection run {} finished: {}/{} tasks succeeded, {} slots",
            result.run_id, result.analysis.succeeded, result.analysis.total_tasks, result.analysis.total_slots
        );
        result
    }

    /// Run one task through its retry budget.
    async fn execute_task(&self, city: &str, date: NaiveDate, plan: &WorkPlan) -> TaskOutcome {
        let started = Instant::now();
        let mut attempts = 0;
        let mut last_error: Option<String> = None;

        while attempts < plan.policy.max_retries {
            attempts += 1;
            self.metrics.lock().unwrap().tasks_attempted += 1;

            if self.breaker.is_open() {
                // Fail fast without network I/O; the upstream gets its
                // cooldown undisturbed.
                debug!("Circuit open, rejecting task {} {}", city, date);
                self.metrics.lock().unwrap().circuit_rejections += 1;
                counter!("playscanner_collector_circuit_rejections_total").increment(1);
                last_error = Some(ScannerError::CircuitOpen.to_string());
            } else {
                let attempt_started = Instant::now();
                match self.attempt(city, date, plan.policy.task_timeout).await {
                    Ok((slot_count, venue_count)) => {
                        self.breaker.record_success();
                        {
                            let mut m = self.metrics.lock().unwrap();
                            m.tasks_succeeded += 1;
                            m.slots_collected += slot_count as u64;
                            m.venues_collected += venue_count as u64;
                        }
                        counter!("playscanner_collector_tasks_total", "status" => "success").increment(1);
                        self.log_attempt(
                            city,
                            date,
                            CollectionStatus::Success,
                            slot_count,
                            venue_count,
                            None,
                            attempt_started.elapsed(),
                        )
                        .await;
                        return TaskOutcome {
                            city: city.to_string(),
                            date,
                            status: TaskStatus::Completed,
                            attempts,
                            slot_count,
                            venue_count,
                            duration_ms: started.elapsed().as_millis() as u64,
                            error: None,
                        };
                    }
                    Err(e) => {
                        // Timeouts land here too and are accounted the same.
                        self.breaker.record_failure();
                        self.metrics.lock().unwrap().tasks_failed += 1;
                        counter!("playscanner_collector_tasks_total", "status" => "failure").increment(1);
                        let message = e.to_string();
                        warn!("Task {} {} attempt {} failed: {}", city, date, attempts, message);
                        self.log_attempt(
                            city,
                            date,
                            CollectionStatus::Failure,
                            0,
                            0,
                            Some(message.clone()),
                            attempt_started.elapsed(),
                        )
                        .await;
                        last_error = Some(message);
                    }
                }
            }

            if attempts < plan.policy.max_retries {
                self.metrics.lock().unwrap().retries += 1;
                tokio::time::sleep(plan.retry_delay(attempts)).await;
            }
        }

        TaskOutcome {
            city: city.to_string(),
            date,
            status: TaskStatus::Failed,
            attempts,
            slot_count: 0,
            venue_count: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            error: last_error,
        }
    }

    /// One fetch-and-persist attempt under the per-task timeout.
    async fn attempt(
        &self,
        city: &str,
        date: NaiveDate,
        timeout: Duration,
    ) -> crate::error::Result<(u32, u32)> {
        let params = SearchParams::new(self.sport, city, date);
        let slots = tokio::time::timeout(timeout, self.provider.fetch_availability(&params))
            .await
            .map_err(|_| ScannerError::Timeout(timeout.as_secs()))??;

        // Whole-collection replacement keyed by (city, date, sport).
        self.persistent
            .set_cached(city, date, self.sport, &slots, self.cache_ttl)
            .await?;

        let mut venues: HashMap<String, Venue> = HashMap::new();
        for slot in &slots {
            venues
                .entry(slot.venue.id.clone())
                .or_insert_with(|| slot.venue.clone());
        }
        for venue in venues.values() {
            let raw = self.provider.venue_raw_payload(&venue.id).await;
            if let Err(e) = self.persistent.store_venue(venue, raw.as_ref()).await {
                warn!("Venue upsert failed for {}: {}", venue.id, e);
            }
        }
        Ok((slots.len() as u32, venues.len() as u32))
    }

    async fn log_attempt(
        &self,
        city: &str,
        date: NaiveDate,
        status: CollectionStatus,
        slot_count: u32,
        venue_count: u32,
        error: Option<String>,
        duration: Duration,
    ) {
        self.persistent
            .log_collection(&CollectionLogEntry {
                id: Uuid::new_v4().to_string(),
                city: city.to_string(),
                date,
                sport: self.sport,
                status,
                slot_count,
                venue_count,
                error,
                duration_ms: duration.as_millis() as u64,
                provider: self.provider.name().to_string(),
                created_at: Utc::now(),
            })
            .await;
    }

    /// Single-city, single-date fetch after a systemic failure. One
    /// attempt only; the run is already degraded.
    async fn graceful_degradation(&self, plan: &WorkPlan) -> Option<TaskOutcome> {
        let task = plan.tasks.first()?;
        let started = Instant::now();
        match self.attempt(&task.city, task.date, plan.policy.task_timeout).await {
            Ok((slot_count, venue_count)) => {
                info!("Graceful-degradation fetch recovered {} slots for {}", slot_count, task.city);
                self.breaker.record_success();
                Some(TaskOutcome {
                    city: task.city.clone(),
                    date: task.date,
                    status: TaskStatus::Completed,
                    attempts: 1,
                    slot_count,
                    venue_count,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                })
            }
            Err(e) => {
                warn!("Graceful-degradation fetch failed: {}", e);
                Some(TaskOutcome {
                    city: task.city.clone(),
                    date: task.date,
                    status: TaskStatus::Failed,
                    attempts: 1,
                    slot_count: 0,
                    venue_count: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

fn analyze(outcomes: &[TaskOutcome]) -> RunAnalysis {
    let total_tasks = outcomes.len();
    let succeeded = outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Completed)
        .count();
    let failed = total_tasks - succeeded;
    let total_slots: u64 = outcomes.iter().map(|o| o.slot_count as u64).sum();
    let total_venues: u64 = outcomes.iter().map(|o| o.venue_count as u64).sum();
    let avg_task_ms = if total_tasks > 0 {
        outcomes.iter().map(|o| o.duration_ms).sum::<u64>() / total_tasks as u64
    } else {
        0
    };
    RunAnalysis {
        total_tasks,
        succeeded,
        failed,
        success_rate: if total_tasks > 0 {
            succeeded as f64 / total_tasks as f64
        } else {
            0.0
        },
        total_slots,
        total_venues,
        avg_task_ms,
    }
}
