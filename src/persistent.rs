//! Durable TTL cache over SQLite: availability payloads keyed by
//! (city, date, sport), venue metadata, the provider-owned raw-payload
//! side table, and the append-only collection log.
//!
//! This layer is best effort. Read failures degrade to "no cached data"
//! and log-write failures never abort a collection run; callers always
//! have a live-fetch fallback.

use crate::error::{Result, ScannerError};
use crate::filters;
use crate::types::{
    CourtSlot, ProviderFailure, ResultSource, SearchParams, SearchResult, Sport, Venue,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const UPSERT_MAX_ATTEMPTS: u32 = 3;
const UPSERT_BACKOFF_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Success,
    Failure,
}

impl CollectionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::Success => "success",
            CollectionStatus::Failure => "failure",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "success" => CollectionStatus::Success,
            _ => CollectionStatus::Failure,
        }
    }
}

/// One row of the append-only collection audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionLogEntry {
    pub id: String,
    pub city: String,
    pub date: NaiveDate,
    pub sport: Sport,
    pub status: CollectionStatus,
    pub slot_count: u32,
    pub venue_count: u32,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for the health/stats surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDbStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_slots: u64,
    pub venue_count: usize,
    pub collection_count: usize,
}

/// Cached slots plus how stale they are.
#[derive(Debug, Clone)]
pub struct CachedAvailability {
    pub slots: Vec<CourtSlot>,
    pub age_seconds: u64,
}

pub struct PersistentCacheService {
    conn: Mutex<Connection>,
}

impl PersistentCacheService {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private scratch database, used by tests and diagnostics.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS availability_cache (
                cache_key     TEXT PRIMARY KEY,
                city          TEXT NOT NULL,
                date          TEXT NOT NULL,
                sport         TEXT NOT NULL,
                payload       TEXT NOT NULL,
                slot_count    INTEGER NOT NULL,
                collected_at  INTEGER NOT NULL,
                expires_at    INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS collection_log (
                id           TEXT PRIMARY KEY,
                city         TEXT NOT NULL,
                date         TEXT NOT NULL,
                sport        TEXT NOT NULL,
                status       TEXT NOT NULL,
                slot_count   INTEGER NOT NULL,
                venue_count  INTEGER NOT NULL,
                error        TEXT,
                duration_ms  INTEGER NOT NULL,
                provider     TEXT NOT NULL,
                created_at   INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS venues (
                venue_id      TEXT NOT NULL,
                provider      TEXT NOT NULL,
                name          TEXT NOT NULL,
                city          TEXT NOT NULL,
                payload       TEXT NOT NULL,
                last_seen_at  INTEGER NOT NULL,
                active        INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (provider, venue_id)
            );
            CREATE TABLE IF NOT EXISTS venue_raw (
                provider    TEXT NOT NULL,
                venue_id    TEXT NOT NULL,
                raw         TEXT NOT NULL,
                updated_at  INTEGER NOT NULL,
                PRIMARY KEY (provider, venue_id)
            );
            CREATE INDEX IF NOT EXISTS idx_collection_log_created
                ON collection_log (created_at);
            "#,
        )?;
        Ok(())
    }

    fn cache_key(city: &str, date: NaiveDate, sport: Sport) -> String {
        format!("{}:{}:{}", city.trim().to_lowercase(), date, sport)
    }

    /// Replace the cached collection for (city, date, sport). Retries on
    /// constraint races between concurrent collector runs writing the same
    /// key, with linear backoff.
    pub async fn set_cached(
        &self,
        city: &str,
        date: NaiveDate,
        sport: Sport,
        slots: &[CourtSlot],
        ttl: Duration,
    ) -> Result<()> {
        let key = Self::cache_key(city, date, sport);
        let payload = serde_json::to_string(slots)?;
        let now = Utc::now().timestamp();
        let expires_at = now + ttl.as_secs() as i64;

        let mut last_err = None;
        for attempt in 1..=UPSERT_MAX_ATTEMPTS {
            let result = {
                let conn = self.conn.lock().await;
                conn.execute(
                    "INSERT INTO availability_cache
                         (cache_key, city, date, sport, payload, slot_count, collected_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(cache_key) DO UPDATE SET
                         payload=excluded.payload,
                         slot_count=excluded.slot_count,
                         collected_at=excluded.collected_at,
                         expires_at=excluded.expires_at",
                    params![
                        key,
                        city.trim().to_lowercase(),
                        date.to_string(),
                        sport.as_str(),
                        payload,
                        slots.len() as i64,
                        now,
                        expires_at
                    ],
                )
            };
            match result {
                Ok(_) => {
                    debug!("Cached {} slots under {}", slots.len(), key);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Cache upsert attempt {}/{} failed for {}: {}", attempt, UPSERT_MAX_ATTEMPTS, key, e);
                    last_err = Some(e);
                    if attempt < UPSERT_MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(UPSERT_BACKOFF_MS * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err.map(ScannerError::Database).unwrap_or_else(|| {
            ScannerError::Config("cache upsert failed without an error".into())
        }))
    }

    /// Valid cached slots for (city, date, sport), or None when absent,
    /// expired, or unreadable.
    pub async fn get_cached(
        &self,
        city: &str,
        date: NaiveDate,
        sport: Sport,
    ) -> Option<CachedAvailability> {
        let key = Self::cache_key(city, date, sport);
        let now = Utc::now().timestamp();
        let row: Result<Option<(String, i64)>> = async {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(
                "SELECT payload, collected_at FROM availability_cache
                 WHERE cache_key = ?1 AND expires_at > ?2",
            )?;
            let mut rows = stmt.query(params![key, now])?;
            if let Some(row) = rows.next()? {
                Ok(Some((row.get(0)?, row.get(1)?)))
            } else {
                Ok(None)
            }
        }
        .await;

        match row {
            Ok(Some((payload, collected_at))) => match serde_json::from_str(&payload) {
                Ok(slots) => Some(CachedAvailability {
                    slots,
                    age_seconds: (now - collected_at).max(0) as u64,
                }),
                Err(e) => {
                    warn!("Corrupt cache payload for {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                // Best-effort layer: a read failure is a cache miss.
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Serve a search from the persistent cache, applying the same filter
    /// and sort rules as the live path. None when nothing valid is cached.
    pub async fn search(&self, params: &SearchParams) -> Option<SearchResult> {
        let started = std::time::Instant::now();
        let cached = self
            .get_cached(&params.location, params.date, params.sport)
            .await?;

        let mut slots = cached.slots;
        if let (Some(start), Some(end)) = (params.start_time, params.end_time) {
            slots = filters::filter_by_time_range(slots, start, end);
        }
        if params.max_price.is_some() {
            slots = filters::filter_by_price(slots, None, params.max_price);
        }
        if let Some(indoor) = params.indoor {
            slots = filters::filter_by_indoor(slots, indoor);
        }
        filters::sort_by_time_then_price(&mut slots);

        let providers: Vec<String> = {
            let mut p: Vec<String> = slots.iter().map(|s| s.provider.clone()).collect();
            p.sort_unstable();
            p.dedup();
            p
        };

        Some(SearchResult {
            total_results: slots.len(),
            results: slots,
            search_time_ms: started.elapsed().as_millis() as u64,
            providers,
            source: ResultSource::Cached,
            cache_age_seconds: Some(cached.age_seconds),
            applied_filters: Some(params.clone()),
            provider_errors: Vec::<ProviderFailure>::new(),
        })
    }

    /// Append one collection attempt to the audit log. Failures are logged
    /// and swallowed; a collection run must not die because its audit
    /// write failed.
    pub async fn log_collection(&self, entry: &CollectionLogEntry) {
        let result = {
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT INTO collection_log
                     (id, city, date, sport, status, slot_count, venue_count, error, duration_ms, provider, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.id,
                    entry.city,
                    entry.date.to_string(),
                    entry.sport.as_str(),
                    entry.status.as_str(),
                    entry.slot_count as i64,
                    entry.venue_count as i64,
                    entry.error,
                    entry.duration_ms as i64,
                    entry.provider,
                    entry.created_at.timestamp()
                ],
            )
        };
        if let Err(e) = result {
            warn!("Collection log write failed for {} {}: {}", entry.city, entry.date, e);
        }
    }

    /// Upsert a venue by (provider, venue id), refreshing last-seen. The
    /// provider's opaque raw payload, when given, goes to the side table so
    /// the shared venue row stays provider-agnostic.
    pub async fn store_venue(&self, venue: &Venue, raw: Option<&serde_json::Value>) -> Result<()> {
        let payload = serde_json::to_string(venue)?;
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO venues (venue_id, provider, name, city, payload, last_seen_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
             ON CONFLICT(provider, venue_id) DO UPDATE SET
                 name=excluded.name,
                 city=excluded.city,
                 payload=excluded.payload,
                 last_seen_at=excluded.last_seen_at,
                 active=1",
            params![
                venue.id,
                venue.provider,
                venue.name,
                venue.location.city,
                payload,
                now
            ],
        )?;
        if let Some(raw) = raw {
            conn.execute(
                "INSERT INTO venue_raw (provider, venue_id, raw, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(provider, venue_id) DO UPDATE SET
                     raw=excluded.raw,
                     updated_at=excluded.updated_at",
                params![venue.provider, venue.id, raw.to_string(), now],
            )?;
        }
        Ok(())
    }

    /// Opaque raw payload stored for a venue, if any.
    pub async fn venue_raw(&self, provider: &str, venue_id: &str) -> Option<serde_json::Value> {
        let result: Result<Option<String>> = async {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare("SELECT raw FROM venue_raw WHERE provider = ?1 AND venue_id = ?2")?;
            let mut rows = stmt.query(params![provider, venue_id])?;
            if let Some(row) = rows.next()? {
                Ok(Some(row.get(0)?))
            } else {
                Ok(None)
            }
        }
        .await;
        match result {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Venue raw read failed for {}/{}: {}", provider, venue_id, e);
                None
            }
        }
    }

    pub async fn stats(&self) -> Result<CacheDbStats> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM availability_cache", [], |r| r.get(0))?;
        let valid_entries: i64 = conn.query_row(
            "SELECT COUNT(*) FROM availability_cache WHERE expires_at > ?1",
            params![now],
            |r| r.get(0),
        )?;
        let total_slots: i64 = conn.query_row(
            "SELECT COALESCE(SUM(slot_count), 0) FROM availability_cache WHERE expires_at > ?1",
            params![now],
            |r| r.get(0),
        )?;
        let venue_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM venues WHERE active = 1", [], |r| r.get(0))?;
        let collection_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM collection_log", [], |r| r.get(0))?;
        Ok(CacheDbStats {
            total_entries: total_entries as usize,
            valid_entries: valid_entries as usize,
            expired_entries: (total_entries - valid_entries).max(0) as usize,
            total_slots: total_slots.max(0) as u64,
            venue_count: venue_count as usize,
            collection_count: collection_count as usize,
        })
    }

    /// Database reachability. Unreachability here is a hard failure.
    pub async fn health_check(&self) -> Result<bool> {
        let conn = self.conn.lock().await;
        let one: i64 = conn.query_row("SELECT 1", [], |r| r.get(0))?;
        Ok(one == 1)
    }

    /// Delete rows past expiry. Returns removed row count.
    pub async fn cleanup(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM availability_cache WHERE expires_at <= ?1",
            params![now],
        )?;
        if removed > 0 {
            info!("Removed {} expired cache rows", removed);
        }
        Ok(removed)
    }

    pub async fn recent_collections(&self, limit: usize) -> Vec<CollectionLogEntry> {
        let result: Result<Vec<CollectionLogEntry>> = async {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(
                "SELECT id, city, date, sport, status, slot_count, venue_count, error, duration_ms, provider, created_at
                 FROM collection_log ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                let date_str: String = row.get(2)?;
                let sport_str: String = row.get(3)?;
                let status_str: String = row.get(4)?;
                let created_ts: i64 = row.get(10)?;
                Ok(CollectionLogEntry {
                    id: row.get(0)?,
                    city: row.get(1)?,
                    date: date_str.parse().unwrap_or_else(|_| Utc::now().date_naive()),
                    sport: sport_str.parse().unwrap_or(Sport::Padel),
                    status: CollectionStatus::parse(&status_str),
                    slot_count: row.get::<_, i64>(5)? as u32,
                    venue_count: row.get::<_, i64>(6)? as u32,
                    error: row.get(7)?,
                    duration_ms: row.get::<_, i64>(8)? as u64,
                    provider: row.get(9)?,
                    created_at: DateTime::from_timestamp(created_ts, 0).unwrap_or_else(Utc::now),
                })
            })?;
            Ok(rows.filter_map(|r| r.ok()).collect())
        }
        .await;
        match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Recent collections query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Fraction of successful collection attempts over the last N hours.
    /// 1.0 when no attempts were logged (nothing has failed yet).
    pub async fn success_rate(&self, hours: u32) -> f64 {
        let since = Utc::now().timestamp() - (hours as i64 * 3600);
        let result: Result<(i64, i64)> = async {
            let conn = self.conn.lock().await;
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM collection_log WHERE created_at >= ?1",
                params![since],
                |r| r.get(0),
            )?;
            let successes: i64 = conn.query_row(
                "SELECT COUNT(*) FROM collection_log WHERE created_at >= ?1 AND status = 'success'",
                params![since],
                |r| r.get(0),
            )?;
            Ok((total, successes))
        }
        .await;
        match result {
            Ok((0, _)) => 1.0,
            Ok((total, successes)) => successes as f64 / total as f64,
            Err(e) => {
                warn!("Success rate query failed: {}", e);
                0.0
            }
        }
    }
}
