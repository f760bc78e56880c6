#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Search criteria, pagination, and query result types.
//!
//! These types describe what the storage layer is asked for and what it
//! hands back. They are distinct from the domain records in
//! `shelter_map_shelter_models` and from the HTTP parameter types in
//! `shelter_map_server_models`.

use serde::{Deserialize, Serialize};
use shelter_map_shelter_models::terms::normalize_terms;
use shelter_map_shelter_models::{Location, Need, NeedPriority, ShelterStatus};

/// Maximum number of active needs attached to each search result.
pub const NEED_PREVIEW_LIMIT: usize = 3;

/// Maximum number of groups returned by the urgent-needs aggregate.
pub const URGENT_NEEDS_LIMIT: usize = 20;

/// Filters for a shelter search. Every field is optional; absent fields
/// impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterCriteria {
    /// Case-insensitive substring of name, neighborhood, or city.
    pub search: Option<String>,
    /// Case-insensitive exact city.
    pub city: Option<String>,
    /// Exact shelter status.
    pub status: Option<ShelterStatus>,
    /// Exact accessibility flag.
    pub accessible: Option<bool>,
    /// Exact pet flag.
    pub accepts_pets: Option<bool>,
    /// Restrict to donation points when `Some(true)`.
    pub donation_only: Option<bool>,
    /// Raw need-filter terms, validated against the fixed vocabulary.
    #[serde(default)]
    pub needs: Vec<String>,
}

impl ShelterCriteria {
    /// Returns an equivalent criteria set in canonical form: text trimmed,
    /// empty strings dropped, `donation_only: false` dropped, and need terms
    /// reduced to recognized vocabulary words.
    ///
    /// Two criteria sets that select the same shelters for the same reasons
    /// normalize to equal values.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            search: non_empty(self.search.as_deref()),
            city: non_empty(self.city.as_deref()),
            status: self.status,
            accessible: self.accessible,
            accepts_pets: self.accepts_pets,
            donation_only: self.donation_only.filter(|&only| only),
            needs: normalize_terms(&self.needs)
                .into_iter()
                .map(|term| term.to_string())
                .collect(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Page size bounds for one listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLimits {
    /// Used when no valid size is requested.
    pub default_size: u32,
    /// Requested sizes above this are clamped.
    pub max_size: u32,
}

impl PageLimits {
    /// Public shelter search.
    pub const PUBLIC: Self = Self {
        default_size: 8,
        max_size: 30,
    };

    /// Management panel listing.
    pub const PANEL: Self = Self {
        default_size: 12,
        max_size: 50,
    };
}

/// A normalized page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Page number, at least 1.
    pub page: u32,
    /// Page size, between 1 and the endpoint maximum.
    pub page_size: u32,
}

impl PageRequest {
    /// Normalizes raw values: a missing or non-positive page becomes 1, a
    /// missing or non-positive size becomes the default, and oversized
    /// requests are clamped to the maximum.
    #[must_use]
    pub fn new(page: Option<i64>, page_size: Option<i64>, limits: PageLimits) -> Self {
        let page = page
            .filter(|&p| p >= 1)
            .map_or(1, |p| u32::try_from(p).unwrap_or(u32::MAX));
        let page_size = page_size
            .filter(|&s| s >= 1)
            .map_or(limits.default_size, |s| {
                u32::try_from(s).unwrap_or(u32::MAX).min(limits.max_size)
            });
        Self { page, page_size }
    }

    /// Number of rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// Pagination metadata returned alongside a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Requested page.
    pub page: u32,
    /// Effective page size.
    pub page_size: u32,
    /// Number of matching records across all pages.
    pub total: u64,
    /// `max(ceil(total / page_size), 1)`.
    pub total_pages: u64,
}

impl Pagination {
    /// Builds the metadata for `request` given the matching `total`.
    #[must_use]
    pub fn new(request: PageRequest, total: u64) -> Self {
        let size = u64::from(request.page_size.max(1));
        Self {
            page: request.page,
            page_size: request.page_size,
            total,
            total_pages: total.div_ceil(size).max(1),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page, at most `page_size`.
    pub items: Vec<T>,
    /// Page metadata.
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Converts every item, keeping the metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// A search result: the location plus a preview of its most pressing
/// active needs (at most [`NEED_PREVIEW_LIMIT`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterSummary {
    /// The location.
    #[serde(flatten)]
    pub location: Location,
    /// Active needs, `HIGH` first then most recently updated.
    pub needs: Vec<Need>,
}

/// A single location with its full need list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterDetail {
    /// The location.
    #[serde(flatten)]
    pub location: Location,
    /// Every need regardless of status, `HIGH` first then most recently
    /// updated.
    pub needs: Vec<Need>,
}

/// An active need annotated with its owning location, as read for the
/// urgent-needs aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveNeedRow {
    /// Need category.
    pub category: String,
    /// Need item.
    pub item: String,
    /// Unit, if tracked.
    pub unit: Option<String>,
    /// Priority.
    pub priority: NeedPriority,
    /// Quantity, if tracked.
    pub quantity: Option<f64>,
    /// Owning location id.
    pub shelter_id: String,
    /// Owning location name.
    pub shelter_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_and_defaults() {
        let limits = PageLimits::PUBLIC;
        assert_eq!(
            PageRequest::new(None, None, limits),
            PageRequest {
                page: 1,
                page_size: 8
            }
        );
        assert_eq!(
            PageRequest::new(Some(-3), Some(0), limits),
            PageRequest {
                page: 1,
                page_size: 8
            }
        );
        assert_eq!(PageRequest::new(Some(4), Some(500), limits).page_size, 30);
        assert_eq!(PageRequest::new(Some(2), Some(10), limits).offset(), 10);
        assert_eq!(PageRequest::new(None, Some(51), PageLimits::PANEL).page_size, 50);
    }

    #[test]
    fn total_pages_is_at_least_one() {
        let request = PageRequest::new(Some(1), Some(8), PageLimits::PUBLIC);
        assert_eq!(Pagination::new(request, 0).total_pages, 1);
        assert_eq!(Pagination::new(request, 8).total_pages, 1);
        assert_eq!(Pagination::new(request, 9).total_pages, 2);
        assert_eq!(Pagination::new(request, 17).total_pages, 3);
    }

    #[test]
    fn normalized_criteria_drop_noise() {
        let criteria = ShelterCriteria {
            search: Some("  ".to_string()),
            city: Some(" Juiz de Fora ".to_string()),
            donation_only: Some(false),
            needs: vec!["Água".to_string(), "roupas".to_string(), "água".to_string()],
            ..ShelterCriteria::default()
        };
        let normalized = criteria.normalized();
        assert_eq!(normalized.search, None);
        assert_eq!(normalized.city.as_deref(), Some("Juiz de Fora"));
        assert_eq!(normalized.donation_only, None);
        assert_eq!(normalized.needs, vec!["água".to_string()]);
    }

    #[test]
    fn invalid_terms_normalize_like_no_terms() {
        let with_invalid = ShelterCriteria {
            needs: vec!["roupas".to_string(), "brinquedos".to_string()],
            ..ShelterCriteria::default()
        };
        assert_eq!(with_invalid.normalized(), ShelterCriteria::default());
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let request = PageRequest::new(Some(2), Some(5), PageLimits::PUBLIC);
        let json = serde_json::to_value(Pagination::new(request, 11)).unwrap();
        assert_eq!(json["pageSize"], 5);
        assert_eq!(json["totalPages"], 3);
    }
}
