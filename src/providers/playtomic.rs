//! Playtomic booking platform integration: tenant discovery with a
//! three-strategy fallback chain, availability normalization into
//! `CourtSlot`, and retry with jittered backoff around the whole fetch.

use crate::config::PlaytomicConfig;
use crate::constants::PLAYTOMIC_PROVIDER;
use crate::error::{Result, ScannerError};
use crate::providers::ProviderAdapter;
use crate::scraping::{RateLimiter, ScrapingClient};
use crate::types::{CourtSlot, SearchParams, Sport, SportMeta, Venue, VenueLocation};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rand::Rng;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const TENANT_API_URL: &str = "https://playtomic.io/api/v1/tenants";
const AVAILABILITY_API_URL: &str = "https://playtomic.io/api/v1/availability";
const VENUE_SEARCH_URL: &str = "https://playtomic.io/venues";
const CLUB_SEARCH_URL: &str = "https://playtomic.io/clubs";
const HEALTH_URL: &str = "https://playtomic.io";

const MAX_FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1_000;
const RETRY_JITTER_MS: u64 = 250;

/// A geographic region the provider can resolve free-text locations to.
#[derive(Debug)]
pub struct Region {
    pub key: &'static str,
    keywords: &'static [&'static str],
    lat: f64,
    lng: f64,
    radius_km: u32,
}

const REGIONS: &[Region] = &[
    Region {
        key: "london",
        keywords: &["london", "croydon", "wembley", "greenwich", "camden", "islington"],
        lat: 51.5074,
        lng: -0.1278,
        radius_km: 30,
    },
    Region {
        key: "manchester",
        keywords: &["manchester", "salford", "stockport"],
        lat: 53.4808,
        lng: -2.2426,
        radius_km: 25,
    },
    Region {
        key: "birmingham",
        keywords: &["birmingham", "solihull", "west midlands"],
        lat: 52.4862,
        lng: -1.8904,
        radius_km: 25,
    },
    Region {
        key: "leeds",
        keywords: &["leeds", "bradford", "wakefield"],
        lat: 53.8008,
        lng: -1.5491,
        radius_km: 25,
    },
    Region {
        key: "bristol",
        keywords: &["bristol", "bath"],
        lat: 51.4545,
        lng: -2.5879,
        radius_km: 25,
    },
];

/// Venues matching these are upstream noise (test tenants, closed clubs)
/// and are dropped during discovery.
const DENY_EXACT: &[&str] = &["Test Club", "Demo Venue", "Playtomic Test"];
const DENY_PATTERNS: &[&str] = &["test", "demo", "do not book", "closed"];

pub struct PlaytomicProvider {
    client: ScrapingClient,
    rate_limiter: RateLimiter,
    config: PlaytomicConfig,
    sports: Vec<Sport>,
    /// Raw tenant payloads from the last discovery, keyed by venue id.
    /// Lets availability be re-queried without re-discovering the venue.
    raw_tenants: Mutex<HashMap<String, Value>>,
    /// Diagnostics-only mode: process a single venue per fetch.
    debug_single_venue: bool,
}

impl PlaytomicProvider {
    pub fn new(config: PlaytomicConfig) -> Result<Self> {
        let client = ScrapingClient::new(Duration::from_secs(config.request_timeout_secs))?;
        let rate_limiter = RateLimiter::new(config.requests_per_second as usize);
        Ok(Self {
            client,
            rate_limiter,
            config,
            sports: vec![Sport::Padel, Sport::Football],
            raw_tenants: Mutex::new(HashMap::new()),
            debug_single_venue: false,
        })
    }

    /// Restrict each fetch to the first discovered venue. Diagnostics only.
    pub fn with_debug_single_venue(mut self) -> Self {
        self.debug_single_venue = true;
        self
    }

    /// Map a free-text location onto a known region. Unrecognized locations
    /// fall back to the baseline region rather than erroring.
    pub fn detect_region(location: &str) -> &'static Region {
        let needle = location.trim().to_lowercase();
        for region in REGIONS {
            if region.keywords.iter().any(|kw| needle.contains(kw)) {
                return region;
            }
        }
        debug!("No region match for '{}', defaulting to {}", location, REGIONS[0].key);
        &REGIONS[0]
    }

    fn is_denied(name: &str) -> bool {
        if DENY_EXACT.iter().any(|d| d.eq_ignore_ascii_case(name)) {
            return true;
        }
        let lower = name.to_lowercase();
        DENY_PATTERNS.iter().any(|p| lower.contains(p))
    }

    /// Parse one tenant object into a Venue, applying the status check and
    /// name deny-lists. Returns None for entries that should be dropped.
    fn parse_tenant(&self, tenant: &Value, fallback_city: &str) -> Option<Venue> {
        let id = tenant["tenant_id"]
            .as_str()
            .or_else(|| tenant["id"].as_str())?
            .to_string();
        let name = tenant["tenant_name"]
            .as_str()
            .or_else(|| tenant["name"].as_str())?
            .to_string();

        if let Some(status) = tenant["tenant_status"].as_str() {
            if !status.eq_ignore_ascii_case("ACTIVE") {
                debug!("Dropping tenant '{}' with status {}", name, status);
                return None;
            }
        }
        if Self::is_denied(&name) {
            debug!("Dropping deny-listed tenant '{}'", name);
            return None;
        }

        let address = &tenant["address"];
        let location = VenueLocation {
            address: address["street"].as_str().unwrap_or_default().to_string(),
            city: address["city"]
                .as_str()
                .unwrap_or(fallback_city)
                .to_lowercase(),
            postcode: address["postal_code"].as_str().map(|s| s.to_string()),
            lat: address["coordinate"]["lat"].as_f64().unwrap_or(0.0),
            lng: address["coordinate"]["lon"].as_f64().unwrap_or(0.0),
        };

        let images = tenant["images"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let amenities = tenant["properties"]["amenities"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Some(Venue {
            id,
            name,
            provider: PLAYTOMIC_PROVIDER.to_string(),
            location,
            amenities,
            images,
            rating: tenant["rating"].as_f64().map(|r| r as f32),
            phone: tenant["contact"]["phone"].as_str().map(|s| s.to_string()),
            website: tenant["contact"]["web"].as_str().map(|s| s.to_string()),
        })
    }

    /// Strategy (a): structured tenant API query by coordinates + radius.
    async fn discover_via_api(&self, region: &Region, sport: Sport) -> Result<Vec<Venue>> {
        self.rate_limiter.limit().await;
        let sport_id = match sport {
            Sport::Padel => "PADEL",
            Sport::Football => "FOOTBALL",
        };
        let url = format!(
            "{TENANT_API_URL}?coordinate={},{}&radius={}&sport_id={}&playtomic_status=ACTIVE",
            region.lat,
            region.lng,
            region.radius_km * 1_000,
            sport_id
        );
        let tenants: Vec<Value> = self.client.get_json(&url).await?;
        let mut venues = Vec::new();
        let mut raw = self.raw_tenants.lock().await;
        for tenant in &tenants {
            if let Some(venue) = self.parse_tenant(tenant, region.key) {
                raw.insert(venue.id.clone(), tenant.clone());
                venues.push(venue);
            }
        }
        Ok(venues)
    }

    /// Strategy (b): scrape the venue search page. The tenant list is
    /// embedded as JSON in the page; structured extraction first, then a
    /// regex over the markup. Best effort: markup drift yields zero venues,
    /// not an error.
    async fn discover_via_search_page(&self, region: &Region) -> Result<Vec<Venue>> {
        self.rate_limiter.limit().await;
        let url = format!("{VENUE_SEARCH_URL}/{}", region.key);
        let html = self.client.get_text(&url).await?;
        let found = self.extract_tenants_from_html(&html, region);
        Ok(self.remember_raw(found).await)
    }

    /// Strategy (c): alternative URL pattern for club listings.
    async fn discover_via_club_page(&self, region: &Region) -> Result<Vec<Venue>> {
        self.rate_limiter.limit().await;
        let url = format!("{CLUB_SEARCH_URL}/{}", region.key);
        let html = self.client.get_text(&url).await?;
        let found = self.extract_tenants_from_html(&html, region);
        Ok(self.remember_raw(found).await)
    }

    async fn remember_raw(&self, found: Vec<(Venue, Value)>) -> Vec<Venue> {
        let mut raw = self.raw_tenants.lock().await;
        let mut venues = Vec::with_capacity(found.len());
        for (venue, tenant) in found {
            raw.insert(venue.id.clone(), tenant);
            venues.push(venue);
        }
        venues
    }

    fn extract_tenants_from_html(&self, html: &str, region: &Region) -> Vec<(Venue, Value)> {
        let mut venues = Vec::new();

        // Structured pass: embedded application state script.
        let document = Html::parse_document(html);
        if let Ok(selector) = Selector::parse("script#__NEXT_DATA__") {
            for script in document.select(&selector) {
                let body = script.inner_html();
                if let Ok(data) = serde_json::from_str::<Value>(&body) {
                    if let Some(tenants) = find_tenant_array(&data) {
                        for tenant in tenants {
                            if let Some(venue) = self.parse_tenant(&tenant, region.key) {
                                venues.push((venue, tenant));
                            }
                        }
                    }
                }
            }
        }

        // Pattern pass: inline tenant objects in the markup.
        if venues.is_empty() {
            // Unanchored object scan; upstream markup changes make this
            // silently return nothing, which discovery treats as a miss.
            if let Ok(re) = Regex::new(
                r#"\{"tenant_id":"[^"]+","tenant_name":"[^"]+"[^}]*\}"#,
            ) {
                for m in re.find_iter(html) {
                    if let Ok(tenant) = serde_json::from_str::<Value>(m.as_str()) {
                        if let Some(venue) = self.parse_tenant(&tenant, region.key) {
                            venues.push((venue, tenant));
                        }
                    }
                }
            }
        }

        venues
    }

    /// Run the discovery fallback chain, stopping at the first strategy
    /// that yields at least one venue.
    #[instrument(skip(self))]
    async fn discover_venues(&self, region: &Region, sport: Sport) -> Result<Vec<Venue>> {
        match self.discover_via_api(region, sport).await {
            Ok(venues) if !venues.is_empty() => {
                info!("Discovered {} venues via tenant API for {}", venues.len(), region.key);
                return Ok(venues);
            }
            Ok(_) => debug!("Tenant API returned no venues for {}", region.key),
            Err(e) => debug!("Tenant API discovery failed for {}: {}", region.key, e),
        }

        match self.discover_via_search_page(region).await {
            Ok(venues) if !venues.is_empty() => {
                info!("Discovered {} venues via search page for {}", venues.len(), region.key);
                return Ok(venues);
            }
            Ok(_) => debug!("Search page yielded no venues for {}", region.key),
            Err(e) => debug!("Search page discovery failed for {}: {}", region.key, e),
        }

        match self.discover_via_club_page(region).await {
            Ok(venues) if !venues.is_empty() => {
                info!("Discovered {} venues via club page for {}", venues.len(), region.key);
                return Ok(venues);
            }
            Ok(_) => debug!("Club page yielded no venues for {}", region.key),
            Err(e) => debug!("Club page discovery failed for {}: {}", region.key, e),
        }

        Err(ScannerError::provider(
            PLAYTOMIC_PROVIDER,
            "DISCOVERY_FAILED",
            format!("No venues found for region {} via any strategy", region.key),
        ))
    }

    /// Fetch availability for one venue and normalize into slots.
    async fn fetch_venue_slots(
        &self,
        venue: &Venue,
        params: &SearchParams,
    ) -> Result<Vec<CourtSlot>> {
        self.rate_limiter.limit().await;
        let url = format!(
            "{AVAILABILITY_API_URL}?tenant_id={}&sport_id={}&local_start_min={}T00:00:00&local_start_max={}T23:59:59",
            venue.id,
            match params.sport {
                Sport::Padel => "PADEL",
                Sport::Football => "FOOTBALL",
            },
            params.date,
            params.date
        );
        let records: Vec<Value> = self.client.get_json(&url).await?;

        let mut slots = Vec::new();
        for record in &records {
            let Some(resource_slots) = record["slots"].as_array() else {
                continue;
            };
            let indoor = record["properties"]["indoor"].as_bool().unwrap_or(false);
            let lights = record["properties"]["lights"].as_bool().unwrap_or(false);
            let surface = record["properties"]["surface"].as_str().map(|s| s.to_string());
            for raw_slot in resource_slots {
                match self.build_slot(venue, params, raw_slot, indoor, lights, surface.clone()) {
                    Ok(slot) => slots.push(slot),
                    Err(e) => debug!("Skipping unparseable slot at {}: {}", venue.name, e),
                }
            }
        }
        Ok(Self::apply_request_filters(slots, params))
    }

    fn build_slot(
        &self,
        venue: &Venue,
        params: &SearchParams,
        raw: &Value,
        indoor: bool,
        lights: bool,
        surface: Option<String>,
    ) -> Result<CourtSlot> {
        let start_str = raw["start_time"]
            .as_str()
            .ok_or_else(|| ScannerError::MissingField("start_time not found".into()))?;
        // Provider times are venue-local wall clock for the requested date.
        // Combine date + time directly; converting through another zone
        // would shift displayed times.
        let start_time = parse_local_time(start_str)?;
        let start: NaiveDateTime = params.date.and_time(start_time);

        let duration_minutes = raw["duration"]
            .as_u64()
            .ok_or_else(|| ScannerError::MissingField("duration not found".into()))?
            as u32;
        let end = start + chrono::Duration::minutes(duration_minutes as i64);

        let (price, currency) = parse_price_minor(&raw["price"])?;

        let meta = match params.sport {
            Sport::Padel => SportMeta::Padel {
                court_type: raw["court_type"].as_str().map(|s| s.to_string()),
                level_range: raw["level_range"].as_str().map(|s| s.to_string()),
                double_court: raw["double_court"].as_bool().unwrap_or(true),
            },
            Sport::Football => SportMeta::Football {
                format: raw["format"].as_str().map(|s| s.to_string()),
                team_size: raw["team_size"].as_u64().map(|n| n as u8),
            },
        };

        Ok(CourtSlot {
            id: CourtSlot::derive_id(PLAYTOMIC_PROVIDER, &venue.id, start),
            sport: params.sport,
            provider: PLAYTOMIC_PROVIDER.to_string(),
            venue: venue.clone(),
            start,
            end,
            duration_minutes,
            price,
            currency,
            booking_url: self.booking_url(&venue.id, params.date),
            available_count: raw["available_count"].as_u64().unwrap_or(1) as u32,
            indoor,
            lights,
            surface,
            meta,
            collected_at: Utc::now(),
        })
    }

    /// Apply the request's time/price/indoor filters before returning.
    fn apply_request_filters(slots: Vec<CourtSlot>, params: &SearchParams) -> Vec<CourtSlot> {
        let mut slots = slots;
        if let (Some(start), Some(end)) = (params.start_time, params.end_time) {
            slots = crate::filters::filter_by_time_range(slots, start, end);
        }
        if params.max_price.is_some() {
            slots = crate::filters::filter_by_price(slots, None, params.max_price);
        }
        if let Some(indoor) = params.indoor {
            slots = crate::filters::filter_by_indoor(slots, indoor);
        }
        slots
    }

    /// One full availability pass: discovery, then batched per-venue
    /// fetches. Individual venue failures are swallowed and counted.
    async fn fetch_once(&self, params: &SearchParams) -> Result<Vec<CourtSlot>> {
        let region = Self::detect_region(&params.location);
        let venues = self.discover_venues(region, params.sport).await?;

        let venues: Vec<Venue> = if self.debug_single_venue {
            warn!("Debug single-venue mode active; processing only the first venue");
            venues.into_iter().take(1).collect()
        } else {
            venues
        };

        let total_venues = venues.len();
        let batch_size = self.config.venue_batch_size.max(1);
        let batch_count = venues.chunks(batch_size).len();
        let mut all_slots = Vec::new();
        let mut failed_venues = 0usize;
        for (batch_index, batch) in venues.chunks(batch_size).enumerate() {
            for venue in batch {
                match self.fetch_venue_slots(venue, params).await {
                    Ok(mut slots) => {
                        debug!("{} slots at {}", slots.len(), venue.name);
                        all_slots.append(&mut slots);
                    }
                    Err(e) => {
                        // Per-venue failure: omit the venue, keep going.
                        debug!("Omitting venue {} after fetch failure: {}", venue.name, e);
                        failed_venues += 1;
                    }
                }
            }
            // No pause after the final batch.
            if pause_between_batches(batch_index, batch_count) {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        if failed_venues > 0 {
            warn!("{} of {} venues omitted after fetch failures", failed_venues, total_venues);
        }
        info!(
            "Fetched {} slots from {} for {} on {}",
            all_slots.len(),
            region.key,
            params.sport,
            params.date
        );
        Ok(all_slots)
    }

}

#[async_trait::async_trait]
impl ProviderAdapter for PlaytomicProvider {
    fn name(&self) -> &'static str {
        PLAYTOMIC_PROVIDER
    }

    fn sports(&self) -> &[Sport] {
        &self.sports
    }

    fn regions(&self) -> &[&'static str] {
        &["london", "manchester", "birmingham", "leeds", "bristol"]
    }

    fn requests_per_second(&self) -> usize {
        self.config.requests_per_second as usize
    }

    #[instrument(skip(self, params), fields(sport = %params.sport, location = %params.location, date = %params.date))]
    async fn fetch_availability(&self, params: &SearchParams) -> Result<Vec<CourtSlot>> {
        let mut last_err = None;
        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            match self.fetch_once(params).await {
                Ok(slots) => return Ok(slots),
                Err(e) => {
                    warn!("Fetch attempt {}/{} failed: {}", attempt, MAX_FETCH_ATTEMPTS, e);
                    last_err = Some(e);
                    if attempt < MAX_FETCH_ATTEMPTS {
                        let delay = retry_delay(attempt);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(match last_err {
            Some(ScannerError::Scraping { status, message }) => {
                ScannerError::Scraping { status, message }
            }
            Some(other) => ScannerError::scraping(
                format!("Availability fetch failed after {MAX_FETCH_ATTEMPTS} attempts: {other}"),
                None,
            ),
            None => ScannerError::scraping("Availability fetch failed", None),
        })
    }

    async fn venue_details(&self, venue_id: &str) -> Result<Option<Venue>> {
        self.rate_limiter.limit().await;
        let url = format!("{TENANT_API_URL}/{venue_id}");
        match self.client.get_json::<Value>(&url).await {
            Ok(tenant) => Ok(self.parse_tenant(&tenant, "")),
            Err(e) => {
                debug!("Venue detail fetch failed for {}: {}", venue_id, e);
                Ok(None)
            }
        }
    }

    /// Raw tenant payload captured at discovery time.
    async fn venue_raw_payload(&self, venue_id: &str) -> Option<Value> {
        self.raw_tenants.lock().await.get(venue_id).cloned()
    }

    async fn health_check(&self) -> bool {
        self.client.probe(HEALTH_URL).await
    }

    fn booking_url(&self, venue_id: &str, date: NaiveDate) -> String {
        format!("https://playtomic.io/tenant/{venue_id}?date={date}")
    }
}

/// The politeness pause goes between batches, not after the last one.
fn pause_between_batches(batch_index: usize, batch_count: usize) -> bool {
    batch_index + 1 < batch_count
}

/// Exponential backoff with jitter: base × 2^(attempt-1) + random jitter.
fn retry_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MS);
    Duration::from_millis(base + jitter)
}

/// Provider times arrive as "HH:MM:SS" or "HH:MM".
fn parse_local_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| ScannerError::MissingField(format!("Unparseable start_time '{s}': {e}")))
}

/// Prices arrive as "22.5 GBP", "22.50GBP", or a bare number. The decimal
/// amount is rounded to integer minor units; floats never leave this
/// function.
fn parse_price_minor(raw: &Value) -> Result<(u32, String)> {
    if let Some(s) = raw.as_str() {
        let trimmed = s.trim();
        let split_at = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (amount_part, currency_part) = trimmed.split_at(split_at);
        let amount: f64 = amount_part.trim().parse().map_err(|_| {
            ScannerError::MissingField(format!("Unparseable price '{s}'"))
        })?;
        let currency = if currency_part.trim().is_empty() {
            "GBP".to_string()
        } else {
            currency_part.trim().to_uppercase()
        };
        Ok(((amount * 100.0).round() as u32, currency))
    } else if let Some(n) = raw.as_f64() {
        Ok(((n * 100.0).round() as u32, "GBP".to_string()))
    } else {
        Err(ScannerError::MissingField("price not found".into()))
    }
}

/// Walk the embedded page state looking for an array of tenant objects.
fn find_tenant_array(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(arr) => {
            if arr
                .first()
                .map(|v| v.get("tenant_id").is_some() || v.get("tenant_name").is_some())
                .unwrap_or(false)
            {
                Some(arr.clone())
            } else {
                arr.iter().find_map(find_tenant_array)
            }
        }
        Value::Object(map) => map.values().find_map(find_tenant_array),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> PlaytomicProvider {
        PlaytomicProvider::new(PlaytomicConfig::default()).unwrap()
    }

    #[test]
    fn region_detection_matches_keywords() {
        assert_eq!(PlaytomicProvider::detect_region("Central London").key, "london");
        assert_eq!(PlaytomicProvider::detect_region("MANCHESTER city centre").key, "manchester");
        assert_eq!(PlaytomicProvider::detect_region("salford quays").key, "manchester");
    }

    #[test]
    fn region_detection_falls_back_to_baseline() {
        assert_eq!(PlaytomicProvider::detect_region("Nowhereville").key, "london");
    }

    #[test]
    fn deny_list_drops_test_tenants() {
        let p = provider();
        let tenant = json!({
            "tenant_id": "t1",
            "tenant_name": "Padel TEST Arena",
            "tenant_status": "ACTIVE",
            "address": {"street": "1 Lane", "city": "london",
                        "coordinate": {"lat": 51.5, "lon": -0.1}}
        });
        assert!(p.parse_tenant(&tenant, "london").is_none());
    }

    #[test]
    fn inactive_tenants_are_dropped() {
        let p = provider();
        let tenant = json!({
            "tenant_id": "t2",
            "tenant_name": "Riverside Padel",
            "tenant_status": "INACTIVE",
            "address": {"street": "2 Lane", "city": "london",
                        "coordinate": {"lat": 51.5, "lon": -0.1}}
        });
        assert!(p.parse_tenant(&tenant, "london").is_none());
    }

    #[test]
    fn active_tenant_parses_into_venue() {
        let p = provider();
        let tenant = json!({
            "tenant_id": "t3",
            "tenant_name": "Riverside Padel",
            "tenant_status": "ACTIVE",
            "address": {"street": "3 Lane", "city": "London", "postal_code": "E1 6AN",
                        "coordinate": {"lat": 51.51, "lon": -0.08}},
            "images": ["https://img/1.jpg"],
            "rating": 4.5
        });
        let venue = p.parse_tenant(&tenant, "london").unwrap();
        assert_eq!(venue.id, "t3");
        assert_eq!(venue.provider, PLAYTOMIC_PROVIDER);
        assert_eq!(venue.location.city, "london");
        assert_eq!(venue.location.postcode.as_deref(), Some("E1 6AN"));
        assert_eq!(venue.images.len(), 1);
    }

    #[test]
    fn price_parsing_rounds_to_minor_units() {
        assert_eq!(parse_price_minor(&json!("22.5 GBP")).unwrap(), (2250, "GBP".into()));
        assert_eq!(parse_price_minor(&json!("30EUR")).unwrap(), (3000, "EUR".into()));
        assert_eq!(parse_price_minor(&json!(19.995)).unwrap(), (2000, "GBP".into()));
        assert!(parse_price_minor(&json!(null)).is_err());
    }

    #[test]
    fn slot_times_are_venue_local_wall_clock() {
        let p = provider();
        let venue = Venue {
            id: "t3".into(),
            name: "Riverside Padel".into(),
            provider: PLAYTOMIC_PROVIDER.into(),
            location: VenueLocation {
                address: "3 Lane".into(),
                city: "london".into(),
                postcode: None,
                lat: 51.51,
                lng: -0.08,
            },
            amenities: vec![],
            images: vec![],
            rating: None,
            phone: None,
            website: None,
        };
        let params = SearchParams::new(
            Sport::Padel,
            "london",
            NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
        );
        let raw = json!({"start_time": "14:00:00", "duration": 90, "price": "24 GBP"});
        let slot = p.build_slot(&venue, &params, &raw, true, false, None).unwrap();
        // 14:00 on the requested date, no timezone shifting.
        assert_eq!(slot.start.time(), NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert_eq!(slot.start.date(), params.date);
        assert_eq!(slot.end.time(), NaiveTime::from_hms_opt(15, 30, 0).unwrap());
        assert_eq!(slot.price, 2400);
        assert_eq!(slot.id, CourtSlot::derive_id(PLAYTOMIC_PROVIDER, "t3", slot.start));
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let first = retry_delay(1);
        let second = retry_delay(2);
        assert!(first >= Duration::from_millis(1_000));
        assert!(first <= Duration::from_millis(1_000 + RETRY_JITTER_MS));
        assert!(second >= Duration::from_millis(2_000));
        assert!(second <= Duration::from_millis(2_000 + RETRY_JITTER_MS));
    }

    #[test]
    fn tenant_array_is_found_in_nested_page_state() {
        let state = json!({
            "props": {"pageProps": {"results": [
                {"tenant_id": "a", "tenant_name": "Club A"},
                {"tenant_id": "b", "tenant_name": "Club B"}
            ]}}
        });
        let tenants = find_tenant_array(&state).unwrap();
        assert_eq!(tenants.len(), 2);
    }

    #[test]
    fn no_pause_after_the_final_batch() {
        assert!(!pause_between_batches(0, 1));
        assert!(pause_between_batches(0, 2));
        assert!(!pause_between_batches(1, 2));
        assert!(!pause_between_batches(0, 0));
    }

    #[test]
    fn booking_url_is_pure() {
        let p = provider();
        let url = p.booking_url("t9", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(url, "https://playtomic.io/tenant/t9?date=2025-01-01");
    }
}
