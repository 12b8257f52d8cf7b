//! Work planning for collection runs: one task per (city, date) pair,
//! scored so near-term and peak-demand dates are collected first.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One scheduled (city, date) unit of collection work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionTask {
    pub city: String,
    pub date: NaiveDate,
    pub priority: u32,
    pub attempts: u32,
    pub status: TaskStatus,
}

/// Execution policy applied to every task in a plan.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub max_concurrent: usize,
    pub task_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            task_timeout: Duration::from_secs(crate::constants::COLLECTOR_TASK_TIMEOUT_SECS),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
        }
    }
}

/// The full set of tasks for one collection run plus its policy.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    pub tasks: Vec<CollectionTask>,
    pub policy: ExecutionPolicy,
}

/// Priority heuristic: near-term dates score higher, and weekend /
/// Friday-Saturday peak-demand dates get bonuses. Higher runs first.
pub fn priority_score(date: NaiveDate, today: NaiveDate) -> u32 {
    let days_from_now = (date - today).num_days().max(0) as u32;
    let mut score = 100;
    score += 50 / (1 + days_from_now);
    match date.weekday() {
        Weekday::Sat => score += 20 + 15,
        Weekday::Sun => score += 20,
        Weekday::Fri => score += 15,
        _ => {}
    }
    score
}

impl WorkPlan {
    /// One task per (city, date) for the next `days_ahead` days, sorted
    /// highest priority first. Ordering within equal priority follows city
    /// input order, which keeps plans deterministic.
    pub fn build(cities: &[String], days_ahead: u32, today: NaiveDate, policy: ExecutionPolicy) -> Self {
        let mut tasks = Vec::with_capacity(cities.len() * days_ahead as usize);
        for offset in 0..days_ahead {
            let date = today + chrono::Duration::days(offset as i64);
            let priority = priority_score(date, today);
            for city in cities {
                tasks.push(CollectionTask {
                    city: city.clone(),
                    date,
                    priority,
                    attempts: 0,
                    status: TaskStatus::Pending,
                });
            }
        }
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { tasks, policy }
    }

    /// Backoff before retry `attempt` (1-based): base × 2^(attempt−1), capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .policy
            .retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.policy.retry_max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        // 2025-06-09 is a Monday.
        NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
    }

    #[test]
    fn nearer_dates_score_higher() {
        let today = monday();
        let tomorrow = today + chrono::Duration::days(1);
        let next_week = today + chrono::Duration::days(6);
        assert!(priority_score(tomorrow, today) > priority_score(next_week, today));
    }

    #[test]
    fn saturday_gets_weekend_and_peak_bonus() {
        let today = monday();
        let thursday = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        let friday = NaiveDate::from_ymd_opt(2025, 6, 13).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert!(priority_score(friday, today) > priority_score(thursday, today));
        assert!(priority_score(saturday, today) > priority_score(friday, today));
    }

    #[test]
    fn plan_is_sorted_by_priority_desc() {
        let cities = vec!["london".to_string(), "leeds".to_string()];
        let plan = WorkPlan::build(&cities, 7, monday(), ExecutionPolicy::default());
        assert_eq!(plan.tasks.len(), 14);
        for pair in plan.tasks.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
        assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let plan = WorkPlan::build(&["london".to_string()], 1, monday(), ExecutionPolicy::default());
        assert_eq!(plan.retry_delay(1), Duration::from_secs(1));
        assert_eq!(plan.retry_delay(2), Duration::from_secs(2));
        assert_eq!(plan.retry_delay(3), Duration::from_secs(4));
        assert_eq!(plan.retry_delay(10), Duration::from_secs(10));
    }
}
