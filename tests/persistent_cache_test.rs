use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tempfile::tempdir;

use playscanner::persistent::{CollectionLogEntry, CollectionStatus, PersistentCacheService};
use playscanner::types::{
    CourtSlot, ResultSource, SearchParams, Sport, SportMeta, Venue, VenueLocation,
};

fn venue(id: &str) -> Venue {
    Venue {
        id: id.to_string(),
        name: format!("Venue {id}"),
        provider: "playtomic".to_string(),
        location: VenueLocation {
            address: "1 Court Lane".to_string(),
            city: "london".to_string(),
            postcode: Some("E1 6AN".to_string()),
            lat: 51.52,
            lng: -0.07,
        },
        amenities: vec!["parking".to_string()],
        images: vec![],
        rating: Some(4.2),
        phone: None,
        website: None,
    }
}

fn slot(venue_id: &str, date: NaiveDate, hour: u32, price: u32) -> CourtSlot {
    let start = date.and_hms_opt(hour, 0, 0).unwrap();
    CourtSlot {
        id: CourtSlot::derive_id("playtomic", venue_id, start),
        sport: Sport::Padel,
        provider: "playtomic".to_string(),
        venue: venue(venue_id),
        start,
        end: start + chrono::Duration::minutes(90),
        duration_minutes: 90,
        price,
        currency: "GBP".to_string(),
        booking_url: format!("https://playtomic.io/tenant/{venue_id}?date={date}"),
        available_count: 2,
        indoor: true,
        lights: true,
        surface: Some("artificial_grass".to_string()),
        meta: SportMeta::Padel {
            court_type: Some("crystal".to_string()),
            level_range: None,
            double_court: true,
        },
        collected_at: Utc::now(),
    }
}

fn service_on_disk(dir: &tempfile::TempDir) -> PersistentCacheService {
    let path = dir.path().join("cache.db");
    PersistentCacheService::open(&path).unwrap()
}

#[tokio::test]
async fn cached_data_round_trips_and_reports_age() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
    let slots = vec![slot("v1", date, 14, 3000), slot("v2", date, 16, 4500)];

    service
        .set_cached("London", date, Sport::Padel, &slots, Duration::from_secs(3600))
        .await?;

    let cached = service
        .get_cached("london", date, Sport::Padel)
        .await
        .expect("cache hit");
    assert_eq!(cached.slots.len(), 2);
    assert!(cached.age_seconds < 5);
    Ok(())
}

#[tokio::test]
async fn expired_rows_are_invisible_and_swept() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
    let slots = vec![slot("v1", date, 14, 3000)];

    service
        .set_cached("london", date, Sport::Padel, &slots, Duration::from_secs(0))
        .await?;
    // ttl=0 means expires_at == now; the validity check is strict.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(service.get_cached("london", date, Sport::Padel).await.is_none());
    assert_eq!(service.cleanup().await?, 1);
    assert_eq!(service.cleanup().await?, 0);
    Ok(())
}

#[tokio::test]
async fn rewriting_the_same_collection_is_an_upsert() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();

    let first = vec![slot("v1", date, 14, 3000)];
    let second = vec![slot("v1", date, 14, 3000), slot("v1", date, 16, 3500)];
    service
        .set_cached("london", date, Sport::Padel, &first, Duration::from_secs(3600))
        .await?;
    service
        .set_cached("london", date, Sport::Padel, &second, Duration::from_secs(3600))
        .await?;

    let cached = service.get_cached("london", date, Sport::Padel).await.unwrap();
    assert_eq!(cached.slots.len(), 2);
    // Identical upstream data produces identical slot ids across runs.
    assert_eq!(cached.slots[0].id, first[0].id);

    let stats = service.stats().await?;
    assert_eq!(stats.total_entries, 1);
    Ok(())
}

#[tokio::test]
async fn search_applies_filters_and_sorts_cached_slots() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
    let slots = vec![
        slot("v1", date, 18, 5000),
        slot("v2", date, 14, 4500),
        slot("v3", date, 10, 3000),
    ];
    service
        .set_cached("london", date, Sport::Padel, &slots, Duration::from_secs(3600))
        .await?;

    let mut params = SearchParams::new(Sport::Padel, "London", date);
    params.max_price = Some(4500);
    let result = service.search(&params).await.expect("cached result");

    assert_eq!(result.source, ResultSource::Cached);
    assert_eq!(result.total_results, 2);
    // Sorted by start time ascending.
    assert_eq!(result.results[0].venue.id, "v3");
    assert_eq!(result.results[1].venue.id, "v2");
    assert!(result.cache_age_seconds.is_some());
    Ok(())
}

#[tokio::test]
async fn search_misses_when_nothing_cached() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let params = SearchParams::new(
        Sport::Padel,
        "Nowhereville",
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    );
    assert!(service.search(&params).await.is_none());
    Ok(())
}

#[tokio::test]
async fn venue_upsert_keeps_one_row_and_raw_payload() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let v = venue("v1");
    let raw = serde_json::json!({"tenant_id": "v1", "tenant_name": "Venue v1", "internal": true});

    service.store_venue(&v, Some(&raw)).await?;
    service.store_venue(&v, Some(&raw)).await?;

    let stats = service.stats().await?;
    assert_eq!(stats.venue_count, 1);

    let stored = service.venue_raw("playtomic", "v1").await.expect("raw payload");
    assert_eq!(stored["tenant_id"], "v1");
    assert!(service.venue_raw("playtomic", "missing").await.is_none());
    Ok(())
}

#[tokio::test]
async fn collection_log_is_append_only_and_feeds_success_rate() -> Result<()> {
    let dir = tempdir()?;
    let service = service_on_disk(&dir);
    let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();

    for (i, status) in [
        CollectionStatus::Success,
        CollectionStatus::Success,
        CollectionStatus::Failure,
        CollectionStatus::Success,
    ]
    .iter()
    .enumerate()
    {
        service
            .log_collection(&CollectionLogEntry {
                id: format!("entry-{i}"),
                city: "london".to_string(),
                date,
                sport: Sport::Padel,
                status: *status,
                slot_count: 10,
                venue_count: 2,
                error: matches!(status, CollectionStatus::Failure)
                    .then(|| "upstream 500".to_string()),
                duration_ms: 1200,
                provider: "playtomic".to_string(),
                created_at: Utc::now(),
            })
            .await;
    }

    let recent = service.recent_collections(10).await;
    assert_eq!(recent.len(), 4);
    assert!((service.success_rate(24).await - 0.75).abs() < f64::EPSILON);
    Ok(())
}

#[tokio::test]
async fn health_check_succeeds_on_open_database() -> Result<()> {
    let service = PersistentCacheService::open_in_memory()?;
    assert!(service.health_check().await?);
    Ok(())
}
