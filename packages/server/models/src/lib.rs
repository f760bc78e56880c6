#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the shelter map server.
//!
//! Query parameters arrive as loosely typed strings and are turned into
//! [`ShelterCriteria`] and [`PageRequest`] here. Pagination values are
//! clamped or defaulted; only values that cannot be defaulted (an unknown
//! status, a flag that is neither `true` nor `false`) are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelter_map_database_models::{
    PageLimits, PageRequest, ShelterCriteria, ShelterDetail, ShelterSummary,
};
use shelter_map_shelter_models::{Location, Need, NeedTerm, ShelterStatus};

/// A query parameter that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidParamsError {
    /// Status outside `OPEN`, `FULL`, `CLOSED`.
    #[error("invalid status: {0}")]
    Status(String),

    /// Boolean flag other than `true` or `false`.
    #[error("invalid value for {param}: {value}")]
    Boolean {
        /// Parameter name.
        param: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Query parameters for `GET /api/public/shelters`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterSearchParams {
    /// 1-based page number.
    pub page: Option<String>,
    /// Page size.
    pub page_size: Option<String>,
    /// Free-text search over name, neighborhood and city.
    pub search: Option<String>,
    /// Exact city, case-insensitive.
    pub city: Option<String>,
    /// `OPEN`, `FULL` or `CLOSED`.
    pub status: Option<String>,
    /// `true` or `false`.
    pub accessible: Option<String>,
    /// `true` or `false`.
    pub accepts_pets: Option<String>,
    /// `true` restricts to donation points. Any other value is ignored.
    pub donation_only: Option<String>,
    /// Comma-separated need terms.
    pub needs: Option<String>,
}

impl ShelterSearchParams {
    /// Converts the raw parameters using the public page limits.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidParamsError`] for an unknown status or a malformed
    /// `accessible` or `acceptsPets` flag.
    pub fn into_criteria(self) -> Result<(ShelterCriteria, PageRequest), InvalidParamsError> {
        let criteria = ShelterCriteria {
            search: self.search,
            city: self.city,
            status: parse_status(self.status.as_deref())?,
            accessible: parse_flag("accessible", self.accessible.as_deref())?,
            accepts_pets: parse_flag("acceptsPets", self.accepts_pets.as_deref())?,
            donation_only: parse_optional_flag(self.donation_only.as_deref()),
            needs: self
                .needs
                .as_deref()
                .map(NeedTerm::parse_list)
                .unwrap_or_default()
                .iter()
                .map(ToString::to_string)
                .collect(),
        };

        let request = page_request(
            self.page.as_deref(),
            self.page_size.as_deref(),
            PageLimits::PUBLIC,
        );
        Ok((criteria, request))
    }
}

/// Query parameters for `GET /api/panel/shelters`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelShelterParams {
    /// 1-based page number.
    pub page: Option<String>,
    /// Page size.
    pub page_size: Option<String>,
    /// Free-text search.
    pub search: Option<String>,
    /// Exact city, case-insensitive.
    pub city: Option<String>,
    /// `OPEN`, `FULL` or `CLOSED`.
    pub status: Option<String>,
}

impl PanelShelterParams {
    /// Converts the raw parameters using the panel page limits.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidParamsError::Status`] for an unknown status.
    pub fn into_criteria(self) -> Result<(ShelterCriteria, PageRequest), InvalidParamsError> {
        let criteria = ShelterCriteria {
            search: self.search,
            city: self.city,
            status: parse_status(self.status.as_deref())?,
            ..ShelterCriteria::default()
        };

        let request = page_request(
            self.page.as_deref(),
            self.page_size.as_deref(),
            PageLimits::PANEL,
        );
        Ok((criteria, request))
    }
}

fn page_request(page: Option<&str>, page_size: Option<&str>, limits: PageLimits) -> PageRequest {
    let parse = |raw: Option<&str>| raw.and_then(|v| v.trim().parse::<i64>().ok());
    PageRequest::new(parse(page), parse(page_size), limits)
}

fn parse_status(raw: Option<&str>) -> Result<Option<ShelterStatus>, InvalidParamsError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .to_uppercase()
            .parse()
            .map(Some)
            .map_err(|_| InvalidParamsError::Status(value.to_string())),
    }
}

fn parse_flag(param: &'static str, raw: Option<&str>) -> Result<Option<bool>, InvalidParamsError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(value) => Err(InvalidParamsError::Boolean {
            param,
            value: value.to_string(),
        }),
    }
}

/// Like [`parse_flag`], but a value other than `true` or `false` means
/// "not set".
fn parse_optional_flag(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::trim) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

/// A location as returned by the API, with derived display fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLocation {
    /// Stored record.
    #[serde(flatten)]
    pub location: Location,
    /// Free places, absent for donation points.
    pub vacancies: Option<u32>,
    /// Whether the record has not been updated recently.
    pub stale: bool,
}

impl ApiLocation {
    /// Wraps `location`, computing derived fields as of `now`.
    #[must_use]
    pub fn new(location: Location, now: DateTime<Utc>) -> Self {
        Self {
            vacancies: location.vacancies(),
            stale: location.is_stale(now),
            location,
        }
    }
}

/// A location with needs: a search card (need preview) or a detail page
/// (every need).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiShelter {
    /// Location and derived fields.
    #[serde(flatten)]
    pub location: ApiLocation,
    /// Needs in display order.
    pub needs: Vec<Need>,
}

impl ApiShelter {
    /// Builds a search card.
    #[must_use]
    pub fn from_summary(summary: ShelterSummary, now: DateTime<Utc>) -> Self {
        Self {
            location: ApiLocation::new(summary.location, now),
            needs: summary.needs,
        }
    }

    /// Builds a detail view.
    #[must_use]
    pub fn from_detail(detail: ShelterDetail, now: DateTime<Utc>) -> Self {
        Self {
            location: ApiLocation::new(detail.location, now),
            needs: detail.needs,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Short message.
    pub error: String,
    /// Offending value or validation message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// An error without details.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    /// An error with details.
    #[must_use]
    pub fn with_details(error: impl Into<String>, details: impl ToString) -> Self {
        Self {
            error: error.into(),
            details: Some(details.to_string()),
        }
    }
}
