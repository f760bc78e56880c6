#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shelter, donation point, and need domain types.
//!
//! A [`Location`] is either an emergency shelter (with status, capacity and
//! occupancy) or a donation point, sharing the same address and contact
//! fields. Each location owns a list of [`Need`]s describing requested
//! donation items.

pub mod input;
pub mod terms;
pub mod text;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use input::{NeedInput, NeedPatch, ShelterInput, ShelterPatch, ValidationError};
pub use terms::NeedTerm;

/// Hours after which a location's data is considered outdated.
pub const STALE_AFTER_HOURS: i64 = 6;

/// Discriminator stored alongside each location.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationType {
    /// Emergency housing with capacity and occupancy.
    Shelter,
    /// Collection point for donations, no occupancy semantics.
    DonationPoint,
}

/// Operational status of a shelter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ShelterStatus {
    /// Accepting people.
    Open,
    /// At capacity.
    Full,
    /// No longer operating.
    Closed,
}

/// Priority of a need.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NeedPriority {
    /// Urgent.
    High,
    /// Medium.
    Med,
    /// Nice to have.
    Low,
}

impl NeedPriority {
    /// Returns the severity score used for ranking (`HIGH` = 3 down to
    /// `LOW` = 1).
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Med => 2,
            Self::Low => 1,
        }
    }

    /// Returns the display rank, `HIGH` first (0) and `LOW` last (2).
    #[must_use]
    pub const fn rank(self) -> u8 {
        3 - self.severity()
    }
}

/// Lifecycle status of a need.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NeedStatus {
    /// Currently requested.
    Active,
    /// Temporarily not requested.
    Paused,
    /// Received, no longer requested.
    Fulfilled,
}

/// WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in `[-90, 90]`.
    pub lat: f64,
    /// Longitude in `[-180, 180]`.
    pub lng: f64,
}

/// Occupancy data that only exists for shelters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    /// Operational status.
    pub status: ShelterStatus,
    /// Number of people the shelter can house.
    pub capacity: u32,
    /// Number of people currently housed. Never exceeds `capacity`.
    pub occupancy: u32,
}

impl Occupancy {
    /// Returns the number of free places, never negative.
    #[must_use]
    pub const fn vacancies(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy)
    }
}

/// The variant-specific part of a [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    /// A shelter and its occupancy.
    Shelter(Occupancy),
    /// A donation point.
    DonationPoint,
}

impl LocationKind {
    /// Returns the stored discriminator for this variant.
    #[must_use]
    pub const fn location_type(&self) -> LocationType {
        match self {
            Self::Shelter(_) => LocationType::Shelter,
            Self::DonationPoint => LocationType::DonationPoint,
        }
    }

    /// Returns the shelter occupancy, or `None` for donation points.
    #[must_use]
    pub const fn occupancy(&self) -> Option<&Occupancy> {
        match self {
            Self::Shelter(occupancy) => Some(occupancy),
            Self::DonationPoint => None,
        }
    }
}

/// A shelter or donation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Unique identifier.
    pub id: String,
    /// Shelter or donation point specific data.
    #[serde(flatten)]
    pub kind: LocationKind,
    /// Display name.
    pub name: String,
    /// City as entered by staff.
    pub city: String,
    /// Neighborhood.
    pub neighborhood: String,
    /// Street address.
    pub address: String,
    /// Map position.
    pub coordinates: Coordinates,
    /// Wheelchair accessible.
    pub accessible: bool,
    /// Accepts pets.
    pub accepts_pets: bool,
    /// Public phone or other contact.
    pub public_contact: Option<String>,
    /// Opening hours.
    pub hours: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Returns the stored discriminator.
    #[must_use]
    pub const fn location_type(&self) -> LocationType {
        self.kind.location_type()
    }

    /// Returns the shelter status, or `None` for donation points.
    #[must_use]
    pub fn status(&self) -> Option<ShelterStatus> {
        self.kind.occupancy().map(|o| o.status)
    }

    /// Returns free places for shelters, `None` for donation points.
    #[must_use]
    pub fn vacancies(&self) -> Option<u32> {
        self.kind.occupancy().map(Occupancy::vacancies)
    }

    /// Whether the record has not been updated for [`STALE_AFTER_HOURS`].
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_at).num_hours() >= STALE_AFTER_HOURS
    }
}

/// A donation request owned by a single location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Need {
    /// Unique identifier.
    pub id: String,
    /// Owning location.
    pub shelter_id: String,
    /// Free-text category, e.g. "Água".
    pub category: String,
    /// Free-text item description.
    pub item: String,
    /// Priority.
    pub priority: NeedPriority,
    /// Requested amount, `None` when not tracked.
    pub quantity: Option<f64>,
    /// Unit for `quantity`.
    pub unit: Option<String>,
    /// Lifecycle status.
    pub status: NeedStatus,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Orders needs for display: priority (`HIGH` first), then most recently
/// updated, then by id.
pub fn sort_needs_for_display(needs: &mut [Need]) {
    needs.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
