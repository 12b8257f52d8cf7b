pub mod playtomic;

use crate::error::Result;
use crate::types::{CourtSlot, SearchParams, Sport, Venue};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

/// Core trait every booking-platform integration must implement.
///
/// Per-venue failures inside `fetch_availability` are swallowed (the venue
/// is omitted); only systemic failures such as discovery finding no venues
/// through any strategy propagate as errors.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique identifier for this provider.
    fn name(&self) -> &'static str;

    /// Sports this provider can serve.
    fn sports(&self) -> &[Sport];

    /// Region keys this provider covers.
    fn regions(&self) -> &[&'static str];

    /// Target outbound request rate against this provider.
    fn requests_per_second(&self) -> usize;

    /// Discover venues for the request's location and return filtered,
    /// normalized slots for the requested date.
    async fn fetch_availability(&self, params: &SearchParams) -> Result<Vec<CourtSlot>>;

    /// Enriched venue data, where the provider supports it.
    async fn venue_details(&self, _venue_id: &str) -> Result<Option<Venue>> {
        Ok(None)
    }

    /// Opaque provider-specific payload captured for a venue during
    /// discovery. Persisted to the provider-owned side table so
    /// availability can be re-queried without re-discovering the venue.
    async fn venue_raw_payload(&self, _venue_id: &str) -> Option<serde_json::Value> {
        None
    }

    /// Lightweight reachability probe. Never errors.
    async fn health_check(&self) -> bool;

    /// External deep link for booking. Pure, no I/O.
    fn booking_url(&self, venue_id: &str, date: NaiveDate) -> String;
}

/// Lookup table of provider adapters, populated once at startup. Adding a
/// provider is a new type plus one `register` call; search and collection
/// logic never change.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ProviderAdapter>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).cloned()
    }

    pub fn providers_for(&self, sport: Sport) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers
            .values()
            .filter(|p| p.sports().contains(&sport))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.providers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct FakeProvider {
        name: &'static str,
        sports: Vec<Sport>,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        fn sports(&self) -> &[Sport] {
            &self.sports
        }
        fn regions(&self) -> &[&'static str] {
            &["london"]
        }
        fn requests_per_second(&self) -> usize {
            1
        }
        async fn fetch_availability(&self, _params: &SearchParams) -> Result<Vec<CourtSlot>> {
            Ok(vec![])
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn booking_url(&self, venue_id: &str, date: NaiveDate) -> String {
            format!("https://example.com/{venue_id}/{date}")
        }
    }

    #[test]
    fn registry_selects_by_sport() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider {
            name: "padel_only",
            sports: vec![Sport::Padel],
        }));
        registry.register(Arc::new(FakeProvider {
            name: "both",
            sports: vec![Sport::Padel, Sport::Football],
        }));

        assert_eq!(registry.providers_for(Sport::Padel).len(), 2);
        let football = registry.providers_for(Sport::Football);
        assert_eq!(football.len(), 1);
        assert_eq!(football[0].name(), "both");
        assert_eq!(registry.names(), vec!["both", "padel_only"]);
    }
}
