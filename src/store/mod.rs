// Item store backends: PostgreSQL for deployments, in-memory when no
// database is configured (and for the test suite).

pub mod memory;
pub mod postgres;

pub use memory::MemoryItemStore;
pub use postgres::PgItemStore;

use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{Coordinates, Item, ItemDraft, ItemPatch, ItemStatus, ItemType};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Hard ceiling on a requested page size. Larger requests are clamped, not
/// rejected.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Mean earth radius in meters, shared by both backends' great-circle math.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Proximity predicate: great-circle distance from `center` within
/// `radius_m` meters. Records without coordinates never match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub center: Coordinates,
    pub radius_m: f64,
}

/// Conjunction of store predicates. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub user_id: Option<i64>,
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
    /// Exact, case-sensitive category match.
    pub category: Option<String>,
    /// Case-insensitive substring over title, description and tags.
    pub term: Option<String>,
    /// Matches records carrying at least one of the given tags.
    pub tags_any: Option<Vec<String>>,
    /// Inclusive range over date_lost_found; records without the field never
    /// match.
    pub lost_found_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub near: Option<Proximity>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    /// Store order; nearest-first when a proximity predicate is present.
    #[default]
    Unsorted,
    ById,
    ByDateReportedDesc,
}

/// Zero-based page slice, already normalized to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Normalizes raw wire values: negative pages become 0, a missing or
    /// non-positive size falls back to the default, oversized requests are
    /// clamped to [`MAX_PAGE_SIZE`].
    pub fn from_raw(page: i32, size: i32) -> Self {
        let page = page.max(0) as u32;
        let size = if size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            (size as u32).min(MAX_PAGE_SIZE)
        };
        PageRequest { page, size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// Persistence contract for item records. Implementations serialize
/// conflicting writes; callers get no cross-request ordering guarantees.
#[tonic::async_trait]
pub trait ItemStore: Send + Sync {
    /// Persists a new record: generated id, ACTIVE status, stamped
    /// date_reported/created_at/updated_at.
    async fn insert(&self, draft: ItemDraft) -> AppResult<Item>;

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Item>>;

    async fn find(&self, filter: &ItemFilter, sort: Sort) -> AppResult<Vec<Item>>;

    /// Returns the requested slice plus the total match count.
    async fn find_page(
        &self,
        filter: &ItemFilter,
        sort: Sort,
        page: PageRequest,
    ) -> AppResult<(Vec<Item>, u64)>;

    /// Applies a partial update, refreshing updated_at. `None` means the id
    /// has no record.
    async fn update(&self, id: &str, patch: ItemPatch) -> AppResult<Option<Item>>;

    /// Hard delete. `true` when a record was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}

/// Great-circle (haversine) distance in meters between two positions.
pub fn geodesic_distance_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_applies_defaults() {
        let page = PageRequest::from_raw(0, 0);
        assert_eq!(page, PageRequest { page: 0, size: DEFAULT_PAGE_SIZE });
    }

    #[test]
    fn page_request_clamps_size_and_page() {
        let page = PageRequest::from_raw(-3, 5000);
        assert_eq!(page.page, 0);
        assert_eq!(page.size, MAX_PAGE_SIZE);
    }

    #[test]
    fn page_request_offset_multiplies() {
        assert_eq!(PageRequest::from_raw(3, 25).offset(), 75);
    }

    #[test]
    fn geodesic_distance_is_zero_for_same_point() {
        let p = Coordinates { longitude: 139.6917, latitude: 35.6895 };
        assert_eq!(geodesic_distance_m(p, p), 0.0);
    }

    #[test]
    fn geodesic_distance_matches_one_degree_of_longitude_at_equator() {
        let a = Coordinates { longitude: 0.0, latitude: 0.0 };
        let b = Coordinates { longitude: 1.0, latitude: 0.0 };
        // One degree of arc on the mean-radius sphere is ~111.2 km.
        let d = geodesic_distance_m(a, b);
        assert!((d - 111_195.0).abs() < 200.0, "got {}", d);
    }

    #[test]
    fn geodesic_distance_is_symmetric() {
        let a = Coordinates { longitude: 139.6917, latitude: 35.6895 };
        let b = Coordinates { longitude: 135.5023, latitude: 34.6937 };
        let d_ab = geodesic_distance_m(a, b);
        let d_ba = geodesic_distance_m(b, a);
        assert!((d_ab - d_ba).abs() < 1e-6);
        // Tokyo to Osaka is roughly 400 km.
        assert!(d_ab > 380_000.0 && d_ab < 420_000.0, "got {}", d_ab);
    }
}
