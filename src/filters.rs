//! Pure filter and sort utilities over slot collections. No I/O here;
//! both the search service and the persistent cache apply these so cached
//! and live paths filter identically.

use crate::types::CourtSlot;
use chrono::NaiveTime;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    TimeAsc,
    TimeDesc,
    PriceAsc,
    PriceDesc,
}

impl FromStr for SortKey {
    type Err = crate::error::ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time-asc" => Ok(SortKey::TimeAsc),
            "time-desc" => Ok(SortKey::TimeDesc),
            "price-asc" => Ok(SortKey::PriceAsc),
            "price-desc" => Ok(SortKey::PriceDesc),
            other => Err(crate::error::ScannerError::Config(format!(
                "Unknown sort key: {other}"
            ))),
        }
    }
}

/// Keep slots whose local start time falls within [start, end] inclusive.
pub fn filter_by_time_range(slots: Vec<CourtSlot>, start: NaiveTime, end: NaiveTime) -> Vec<CourtSlot> {
    slots
        .into_iter()
        .filter(|slot| {
            let t = slot.start.time();
            t >= start && t <= end
        })
        .collect()
}

/// Keep slots priced within [min, max] inclusive (minor units).
pub fn filter_by_price(slots: Vec<CourtSlot>, min: Option<u32>, max: Option<u32>) -> Vec<CourtSlot> {
    slots
        .into_iter()
        .filter(|slot| {
            min.map_or(true, |m| slot.price >= m) && max.map_or(true, |m| slot.price <= m)
        })
        .collect()
}

/// Keep slots whose venue id appears in the allow-list.
pub fn filter_by_venues(slots: Vec<CourtSlot>, venue_ids: &[String]) -> Vec<CourtSlot> {
    slots
        .into_iter()
        .filter(|slot| venue_ids.iter().any(|id| id == &slot.venue.id))
        .collect()
}

/// Keep indoor or outdoor slots only.
pub fn filter_by_indoor(slots: Vec<CourtSlot>, indoor: bool) -> Vec<CourtSlot> {
    slots.into_iter().filter(|slot| slot.indoor == indoor).collect()
}

/// Stable sort so equal-key slots preserve prior relative order.
pub fn sort_slots(slots: &mut [CourtSlot], key: SortKey) {
    match key {
        SortKey::TimeAsc => slots.sort_by(|a, b| a.start.cmp(&b.start)),
        SortKey::TimeDesc => slots.sort_by(|a, b| b.start.cmp(&a.start)),
        SortKey::PriceAsc => slots.sort_by(|a, b| a.price.cmp(&b.price)),
        SortKey::PriceDesc => slots.sort_by(|a, b| b.price.cmp(&a.price)),
    }
}

/// Canonical result ordering: start time ascending, price ascending on ties.
pub fn sort_by_time_then_price(slots: &mut [CourtSlot]) {
    slots.sort_by(|a, b| a.start.cmp(&b.start).then(a.price.cmp(&b.price)));
}
