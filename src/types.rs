use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sports the engine aggregates availability for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Padel,
    Football,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Padel => "padel",
            Sport::Football => "football",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = crate::error::ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "padel" => Ok(Sport::Padel),
            "football" => Ok(Sport::Football),
            other => Err(crate::error::ScannerError::Config(format!(
                "Unknown sport: {other}"
            ))),
        }
    }
}

/// Immutable search request descriptor. Cache keys are derived from this,
/// so two field-wise equal requests must always produce the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub sport: Sport,
    pub location: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    /// Maximum price in minor currency units (pence).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indoor: Option<bool>,
    /// Sport-specific filters. BTreeMap keeps serialization canonical
    /// regardless of the order the caller inserted keys.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, serde_json::Value>,
}

impl SearchParams {
    pub fn new(sport: Sport, location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            sport,
            location: location.into(),
            date,
            start_time: None,
            end_time: None,
            max_price: None,
            indoor: None,
            filters: BTreeMap::new(),
        }
    }

    /// Deterministic cache key for this request.
    pub fn generate_search_key(&self) -> String {
        let mut key = format!(
            "search:{}:{}:{}",
            self.sport,
            self.location.trim().to_lowercase(),
            self.date.format("%Y-%m-%d")
        );
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            key.push_str(&format!(":t{}-{}", start.format("%H%M"), end.format("%H%M")));
        }
        if let Some(max_price) = self.max_price {
            key.push_str(&format!(":p{max_price}"));
        }
        if let Some(indoor) = self.indoor {
            key.push_str(&format!(":i{}", if indoor { 1 } else { 0 }));
        }
        if !self.filters.is_empty() {
            // BTreeMap serializes in key order, so the digest is canonical.
            let canonical = serde_json::to_string(&self.filters).unwrap_or_default();
            let mut hasher = Sha256::new();
            hasher.update(canonical.as_bytes());
            let digest = hex::encode(hasher.finalize());
            key.push_str(&format!(":f{}", &digest[..16]));
        }
        key
    }
}

/// Structured venue location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueLocation {
    pub address: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

/// A bookable venue discovered by a provider. The provider-specific raw
/// payload is deliberately NOT stored here; providers persist it through
/// their own side table so the shared model stays provider-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub location: VenueLocation,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Sport-specific slot metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sport", rename_all = "lowercase")]
pub enum SportMeta {
    Padel {
        #[serde(skip_serializing_if = "Option::is_none")]
        court_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        level_range: Option<String>,
        double_court: bool,
    },
    Football {
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        team_size: Option<u8>,
    },
}

/// One bookable time window at one venue. Immutable once constructed;
/// a fresh collection run produces new instances rather than mutating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourtSlot {
    /// Deterministic id: provider + venue + start epoch. Repeated
    /// collections of the same slot produce the same id.
    pub id: String,
    pub sport: Sport,
    pub provider: String,
    pub venue: Venue,
    /// Venue-local wall-clock start/end. Never timezone-shifted.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: u32,
    /// Price in minor currency units (pence), never floating point.
    pub price: u32,
    pub currency: String,
    pub booking_url: String,
    pub available_count: u32,
    pub indoor: bool,
    pub lights: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    pub meta: SportMeta,
    pub collected_at: DateTime<Utc>,
}

impl CourtSlot {
    /// Stable slot id used as the idempotent upsert key across collections.
    pub fn derive_id(provider: &str, venue_id: &str, start: NaiveDateTime) -> String {
        format!("{}:{}:{}", provider, venue_id, start.and_utc().timestamp())
    }
}

/// Where a search result was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Live,
    Cached,
}

/// A provider failure captured during a search instead of propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
}

/// Response shape consumed by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub results: Vec<CourtSlot>,
    pub total_results: usize,
    pub search_time_ms: u64,
    /// Providers that contributed results.
    pub providers: Vec<String>,
    pub source: ResultSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_seconds: Option<u64>,
    /// Echo of the request the results were filtered by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_filters: Option<SearchParams>,
    /// Failures swallowed during the fan-out; empty on a fully clean search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_errors: Vec<ProviderFailure>,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_results: 0,
            search_time_ms: 0,
            providers: Vec::new(),
            source: ResultSource::Live,
            cache_age_seconds: None,
            applied_filters: None,
            provider_errors: Vec::new(),
        }
    }
}

/// Result of a provider health probe, memoized by the search service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base_params() -> SearchParams {
        SearchParams::new(
            Sport::Padel,
            "London",
            NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
        )
    }

    #[test]
    fn search_key_is_deterministic_for_equal_params() {
        let mut a = base_params();
        let mut b = base_params();
        a.filters.insert("level".into(), serde_json::json!("intermediate"));
        a.filters.insert("court_type".into(), serde_json::json!("double"));
        // Insert in the opposite order; BTreeMap canonicalizes.
        b.filters.insert("court_type".into(), serde_json::json!("double"));
        b.filters.insert("level".into(), serde_json::json!("intermediate"));

        assert_eq!(a.generate_search_key(), b.generate_search_key());
    }

    #[test]
    fn search_key_lowercases_location() {
        let mut a = base_params();
        a.location = "LONDON".into();
        let b = base_params();
        assert_eq!(a.generate_search_key(), b.generate_search_key());
    }

    #[test]
    fn search_key_distinguishes_filters() {
        let plain = base_params();
        let mut priced = base_params();
        priced.max_price = Some(4500);
        assert_ne!(plain.generate_search_key(), priced.generate_search_key());
    }

    #[test]
    fn slot_id_is_stable_across_collections() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 14)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        let first = CourtSlot::derive_id("playtomic", "venue-1", start);
        let second = CourtSlot::derive_id("playtomic", "venue-1", start);
        assert_eq!(first, second);
        assert_eq!(first, format!("playtomic:venue-1:{}", start.and_utc().timestamp()));
    }
}
