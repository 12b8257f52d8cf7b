//! In-process TTL cache. Entries past their TTL are logically absent even
//! while physically present; reads evict them lazily and a background
//! sweeper bounds memory from entries that are never read again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub expired_entries: usize,
    pub max_entries: usize,
}

/// Bounded TTL key-value cache. Eviction at capacity removes the single
/// oldest entry by write timestamp (FIFO by age, not LRU).
pub struct MemoryCache<T> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<T>>>>,
    max_entries: usize,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Clone + Send + 'static> MemoryCache<T> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_entries,
            sweeper: Mutex::new(None),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            // Evict the single oldest entry by write timestamp.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                debug!("Cache at capacity, evicting oldest entry: {}", oldest);
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Expired entries are treated as absent and evicted on the spot.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.get(key).map_or(false, |e| !e.is_expired())
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().unwrap().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Sweep every physically present expired entry. Returns removal count.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap();
        let expired = entries.values().filter(|e| e.is_expired()).count();
        CacheStats {
            entries: entries.len(),
            expired_entries: expired,
            max_entries: self.max_entries,
        }
    }

    /// Start a periodic sweep task. Replaces any previous sweeper.
    pub fn spawn_sweeper(&self, interval: Duration) {
        let entries = Arc::clone(&self.entries);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut entries = entries.lock().unwrap();
                entries.retain(|_, e| !e.is_expired());
            }
        });
        let mut sweeper = self.sweeper.lock().unwrap();
        if let Some(old) = sweeper.replace(handle) {
            old.abort();
        }
    }

    /// Stop the sweeper and drop all entries. Leaves no periodic work behind.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.clear();
    }
}

impl<T> Drop for MemoryCache<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}
