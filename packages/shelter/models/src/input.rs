//! Write-side payloads for locations and needs, and their validation.
//!
//! Inputs are normalized with [`crate::text::normalize_text`] and checked
//! before anything is persisted. Patches are merged into the stored record
//! first, so invariants such as occupancy not exceeding capacity are checked
//! against the resulting record rather than the patch alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::text::{normalize_optional, normalize_text};
use crate::{
    Coordinates, Location, LocationKind, LocationType, Need, NeedPriority, NeedStatus, Occupancy,
    ShelterStatus,
};

/// Errors raised when a write payload breaks a record invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A text field is shorter or longer than allowed.
    #[error("{field} must be between {min} and {max} characters")]
    Length {
        /// Field name.
        field: &'static str,
        /// Minimum length in characters.
        min: usize,
        /// Maximum length in characters.
        max: usize,
    },

    /// A coordinate is outside its valid range.
    #[error("{field} out of range: {value}")]
    Coordinate {
        /// `lat` or `lng`.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Occupancy exceeds capacity.
    #[error("occupancy ({occupancy}) cannot exceed capacity ({capacity})")]
    OccupancyExceedsCapacity {
        /// Requested occupancy.
        occupancy: u32,
        /// Requested capacity.
        capacity: u32,
    },

    /// Need quantity is zero, negative, or not finite.
    #[error("quantity must be greater than zero")]
    NonPositiveQuantity,
}

/// Payload for creating a shelter or donation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterInput {
    /// Shelter or donation point.
    #[serde(rename = "type", default = "default_location_type")]
    pub location_type: LocationType,
    /// Display name.
    pub name: String,
    /// City.
    pub city: String,
    /// Neighborhood.
    pub neighborhood: String,
    /// Street address.
    pub address: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Shelter status, defaults to `OPEN`. Ignored for donation points.
    #[serde(default)]
    pub status: Option<ShelterStatus>,
    /// Shelter capacity, defaults to 0. Ignored for donation points.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Shelter occupancy, defaults to 0. Ignored for donation points.
    #[serde(default)]
    pub occupancy: Option<u32>,
    /// Wheelchair accessible.
    #[serde(default)]
    pub accessible: bool,
    /// Accepts pets.
    #[serde(default)]
    pub accepts_pets: bool,
    /// Public contact.
    #[serde(default)]
    pub public_contact: Option<String>,
    /// Opening hours.
    #[serde(default)]
    pub hours: Option<String>,
    /// Notes.
    #[serde(default)]
    pub notes: Option<String>,
}

const fn default_location_type() -> LocationType {
    LocationType::Shelter
}

impl ShelterInput {
    /// Builds and validates a new [`Location`] from this input.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if any field breaks an invariant.
    pub fn into_location(
        self,
        id: String,
        now: DateTime<Utc>,
    ) -> Result<Location, ValidationError> {
        let kind = build_kind(self.location_type, self.status, self.capacity, self.occupancy);
        let location = Location {
            id,
            kind,
            name: normalize_text(&self.name),
            city: normalize_text(&self.city),
            neighborhood: normalize_text(&self.neighborhood),
            address: normalize_text(&self.address),
            coordinates: Coordinates {
                lat: self.lat,
                lng: self.lng,
            },
            accessible: self.accessible,
            accepts_pets: self.accepts_pets,
            public_contact: normalize_optional(self.public_contact.as_deref()),
            hours: normalize_optional(self.hours.as_deref()),
            notes: normalize_optional(self.notes.as_deref()),
            updated_at: now,
        };
        validate_location(&location)?;
        Ok(location)
    }
}

/// Partial update for a location. Absent fields keep their stored value;
/// an empty string clears an optional text field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterPatch {
    /// New discriminator.
    #[serde(rename = "type", default)]
    pub location_type: Option<LocationType>,
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New city.
    #[serde(default)]
    pub city: Option<String>,
    /// New neighborhood.
    #[serde(default)]
    pub neighborhood: Option<String>,
    /// New address.
    #[serde(default)]
    pub address: Option<String>,
    /// New latitude.
    #[serde(default)]
    pub lat: Option<f64>,
    /// New longitude.
    #[serde(default)]
    pub lng: Option<f64>,
    /// New status.
    #[serde(default)]
    pub status: Option<ShelterStatus>,
    /// New capacity.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// New occupancy.
    #[serde(default)]
    pub occupancy: Option<u32>,
    /// New accessibility flag.
    #[serde(default)]
    pub accessible: Option<bool>,
    /// New pet flag.
    #[serde(default)]
    pub accepts_pets: Option<bool>,
    /// New public contact.
    #[serde(default)]
    pub public_contact: Option<String>,
    /// New hours.
    #[serde(default)]
    pub hours: Option<String>,
    /// New notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl ShelterPatch {
    /// Merges this patch into `existing` and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the merged record breaks an invariant,
    /// for example occupancy above capacity.
    pub fn apply(
        &self,
        existing: &Location,
        now: DateTime<Utc>,
    ) -> Result<Location, ValidationError> {
        let current = existing.kind.occupancy();
        let location_type = self.location_type.unwrap_or_else(|| existing.location_type());
        let kind = build_kind(
            location_type,
            self.status.or_else(|| current.map(|o| o.status)),
            self.capacity.or_else(|| current.map(|o| o.capacity)),
            self.occupancy.or_else(|| current.map(|o| o.occupancy)),
        );

        let location = Location {
            id: existing.id.clone(),
            kind,
            name: merge_text(self.name.as_deref(), &existing.name),
            city: merge_text(self.city.as_deref(), &existing.city),
            neighborhood: merge_text(self.neighborhood.as_deref(), &existing.neighborhood),
            address: merge_text(self.address.as_deref(), &existing.address),
            coordinates: Coordinates {
                lat: self.lat.unwrap_or(existing.coordinates.lat),
                lng: self.lng.unwrap_or(existing.coordinates.lng),
            },
            accessible: self.accessible.unwrap_or(existing.accessible),
            accepts_pets: self.accepts_pets.unwrap_or(existing.accepts_pets),
            public_contact: merge_optional(
                self.public_contact.as_deref(),
                existing.public_contact.as_deref(),
            ),
            hours: merge_optional(self.hours.as_deref(), existing.hours.as_deref()),
            notes: merge_optional(self.notes.as_deref(), existing.notes.as_deref()),
            updated_at: now,
        };
        validate_location(&location)?;
        Ok(location)
    }
}

/// Payload for creating a need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedInput {
    /// Category, e.g. "Água".
    pub category: String,
    /// Item description.
    pub item: String,
    /// Priority.
    pub priority: NeedPriority,
    /// Requested amount.
    #[serde(default)]
    pub quantity: Option<f64>,
    /// Unit.
    #[serde(default)]
    pub unit: Option<String>,
    /// Lifecycle status, defaults to `ACTIVE`.
    #[serde(default)]
    pub status: Option<NeedStatus>,
    /// Notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NeedInput {
    /// Builds and validates a new [`Need`] owned by `shelter_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if any field breaks an invariant.
    pub fn into_need(
        self,
        id: String,
        shelter_id: String,
        now: DateTime<Utc>,
    ) -> Result<Need, ValidationError> {
        let need = Need {
            id,
            shelter_id,
            category: normalize_text(&self.category),
            item: normalize_text(&self.item),
            priority: self.priority,
            quantity: self.quantity,
            unit: normalize_optional(self.unit.as_deref()),
            status: self.status.unwrap_or(NeedStatus::Active),
            notes: normalize_optional(self.notes.as_deref()),
            updated_at: now,
        };
        validate_need(&need)?;
        Ok(need)
    }
}

/// Partial update for a need. `quantity: null` clears the quantity, an
/// absent `quantity` keeps it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedPatch {
    /// New category.
    #[serde(default)]
    pub category: Option<String>,
    /// New item.
    #[serde(default)]
    pub item: Option<String>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<NeedPriority>,
    /// New quantity, `Some(None)` to clear.
    #[serde(default, deserialize_with = "double_option")]
    pub quantity: Option<Option<f64>>,
    /// New unit.
    #[serde(default)]
    pub unit: Option<String>,
    /// New status.
    #[serde(default)]
    pub status: Option<NeedStatus>,
    /// New notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NeedPatch {
    /// Merges this patch into `existing` and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the merged need breaks an invariant.
    pub fn apply(&self, existing: &Need, now: DateTime<Utc>) -> Result<Need, ValidationError> {
        let need = Need {
            id: existing.id.clone(),
            shelter_id: existing.shelter_id.clone(),
            category: merge_text(self.category.as_deref(), &existing.category),
            item: merge_text(self.item.as_deref(), &existing.item),
            priority: self.priority.unwrap_or(existing.priority),
            quantity: self.quantity.unwrap_or(existing.quantity),
            unit: merge_optional(self.unit.as_deref(), existing.unit.as_deref()),
            status: self.status.unwrap_or(existing.status),
            notes: merge_optional(self.notes.as_deref(), existing.notes.as_deref()),
            updated_at: now,
        };
        validate_need(&need)?;
        Ok(need)
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn build_kind(
    location_type: LocationType,
    status: Option<ShelterStatus>,
    capacity: Option<u32>,
    occupancy: Option<u32>,
) -> LocationKind {
    match location_type {
        LocationType::Shelter => LocationKind::Shelter(Occupancy {
            status: status.unwrap_or(ShelterStatus::Open),
            capacity: capacity.unwrap_or(0),
            occupancy: occupancy.unwrap_or(0),
        }),
        LocationType::DonationPoint => LocationKind::DonationPoint,
    }
}

fn merge_text(patch: Option<&str>, existing: &str) -> String {
    patch.map_or_else(|| existing.to_string(), normalize_text)
}

fn merge_optional(patch: Option<&str>, existing: Option<&str>) -> Option<String> {
    patch.map_or_else(
        || existing.map(ToString::to_string),
        |value| normalize_optional(Some(value)),
    )
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if (min..=max).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::Length { field, min, max })
    }
}

/// Checks every invariant of a location record.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_location(location: &Location) -> Result<(), ValidationError> {
    check_length("name", &location.name, 3, 120)?;
    check_length("city", &location.city, 2, 80)?;
    check_length("neighborhood", &location.neighborhood, 2, 80)?;
    check_length("address", &location.address, 5, 180)?;

    let Coordinates { lat, lng } = location.coordinates;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::Coordinate {
            field: "lat",
            value: lat,
        });
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(ValidationError::Coordinate {
            field: "lng",
            value: lng,
        });
    }

    if let Some(occupancy) = location.kind.occupancy() {
        if occupancy.occupancy > occupancy.capacity {
            return Err(ValidationError::OccupancyExceedsCapacity {
                occupancy: occupancy.occupancy,
                capacity: occupancy.capacity,
            });
        }
    }

    Ok(())
}

/// Checks every invariant of a need record.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_need(need: &Need) -> Result<(), ValidationError> {
    check_length("category", &need.category, 2, 60)?;
    check_length("item", &need.item, 2, 100)?;
    if let Some(quantity) = need.quantity {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ValidationError::NonPositiveQuantity);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap()
    }

    fn shelter_input() -> ShelterInput {
        ShelterInput {
            location_type: LocationType::Shelter,
            name: " Ginásio Poliesportivo ".to_string(),
            city: "Juiz de Fora".to_string(),
            neighborhood: "Benfica".to_string(),
            address: "Av. Presidente Juscelino, 500".to_string(),
            lat: -21.7,
            lng: -43.4,
            status: None,
            capacity: Some(80),
            occupancy: Some(20),
            accessible: true,
            accepts_pets: true,
            public_contact: Some(String::new()),
            hours: None,
            notes: None,
        }
    }

    #[test]
    fn input_builds_normalized_shelter() {
        let location = shelter_input().into_location("s1".to_string(), now()).unwrap();
        assert_eq!(location.name, "Ginásio Poliesportivo");
        assert_eq!(location.status(), Some(ShelterStatus::Open));
        assert_eq!(location.public_contact, None);
        assert_eq!(location.vacancies(), Some(60));
    }

    #[test]
    fn input_rejects_occupancy_above_capacity() {
        let mut input = shelter_input();
        input.occupancy = Some(81);
        assert_eq!(
            input.into_location("s1".to_string(), now()),
            Err(ValidationError::OccupancyExceedsCapacity {
                occupancy: 81,
                capacity: 80
            })
        );
    }

    #[test]
    fn donation_point_ignores_occupancy_fields() {
        let mut input = shelter_input();
        input.location_type = LocationType::DonationPoint;
        input.occupancy = Some(500);
        let location = input.into_location("d1".to_string(), now()).unwrap();
        assert_eq!(location.kind, LocationKind::DonationPoint);
        assert_eq!(location.status(), None);
    }

    #[test]
    fn input_rejects_bad_coordinates_and_short_names() {
        let mut input = shelter_input();
        input.lat = 91.0;
        assert!(matches!(
            input.into_location("s1".to_string(), now()),
            Err(ValidationError::Coordinate { field: "lat", .. })
        ));

        let mut input = shelter_input();
        input.name = "AB".to_string();
        assert!(matches!(
            input.into_location("s1".to_string(), now()),
            Err(ValidationError::Length { field: "name", .. })
        ));
    }

    #[test]
    fn patch_checks_occupancy_against_stored_capacity() {
        let existing = shelter_input().into_location("s1".to_string(), now()).unwrap();

        let patch = ShelterPatch {
            occupancy: Some(81),
            ..ShelterPatch::default()
        };
        assert!(matches!(
            patch.apply(&existing, now()),
            Err(ValidationError::OccupancyExceedsCapacity { .. })
        ));

        let patch = ShelterPatch {
            occupancy: Some(81),
            capacity: Some(100),
            status: Some(ShelterStatus::Full),
            notes: Some("Lotado à noite".to_string()),
            ..ShelterPatch::default()
        };
        let updated = patch.apply(&existing, now()).unwrap();
        assert_eq!(updated.vacancies(), Some(19));
        assert_eq!(updated.status(), Some(ShelterStatus::Full));
        assert_eq!(updated.notes.as_deref(), Some("Lotado à noite"));
        assert_eq!(updated.name, existing.name);
    }

    #[test]
    fn patch_empty_string_clears_optional_text() {
        let mut existing = shelter_input().into_location("s1".to_string(), now()).unwrap();
        existing.hours = Some("24h".to_string());
        let patch = ShelterPatch {
            hours: Some("  ".to_string()),
            ..ShelterPatch::default()
        };
        assert_eq!(patch.apply(&existing, now()).unwrap().hours, None);
    }

    #[test]
    fn need_input_validates_quantity() {
        let input = NeedInput {
            category: "Água".to_string(),
            item: "Água potável".to_string(),
            priority: NeedPriority::High,
            quantity: Some(0.0),
            unit: Some("L".to_string()),
            status: None,
            notes: None,
        };
        assert_eq!(
            input.clone().into_need("n1".to_string(), "s1".to_string(), now()),
            Err(ValidationError::NonPositiveQuantity)
        );

        let need = NeedInput {
            quantity: Some(100.0),
            ..input
        }
        .into_need("n1".to_string(), "s1".to_string(), now())
        .unwrap();
        assert_eq!(need.status, NeedStatus::Active);
        assert_eq!(need.unit.as_deref(), Some("L"));
    }

    #[test]
    fn decomposed_need_text_is_stored_composed() {
        let need = NeedInput {
            category: "A\u{301}gua".to_string(),
            item: "A\u{301}gua pota\u{301}vel".to_string(),
            priority: NeedPriority::High,
            quantity: None,
            unit: None,
            status: None,
            notes: None,
        }
        .into_need("n1".to_string(), "s1".to_string(), now())
        .unwrap();

        assert_eq!(need.category, "Água");
        assert_eq!(need.item, "Água potável");
        assert!(
            need.category
                .to_lowercase()
                .contains(crate::NeedTerm::Agua.as_ref())
        );
    }

    #[test]
    fn need_patch_distinguishes_null_from_absent_quantity() {
        let patch: NeedPatch = serde_json::from_str(r#"{"quantity": null}"#).unwrap();
        assert_eq!(patch.quantity, Some(None));

        let patch: NeedPatch = serde_json::from_str(r#"{"status": "FULFILLED"}"#).unwrap();
        assert_eq!(patch.quantity, None);
        assert_eq!(patch.status, Some(NeedStatus::Fulfilled));
    }

    #[test]
    fn need_patch_merges_into_existing() {
        let existing = NeedInput {
            category: "Alimentos".to_string(),
            item: "Arroz 5kg".to_string(),
            priority: NeedPriority::Med,
            quantity: Some(40.0),
            unit: Some("kg".to_string()),
            status: None,
            notes: None,
        }
        .into_need("n1".to_string(), "s1".to_string(), now())
        .unwrap();

        let patch = NeedPatch {
            quantity: Some(None),
            priority: Some(NeedPriority::High),
            ..NeedPatch::default()
        };
        let updated = patch.apply(&existing, now()).unwrap();
        assert_eq!(updated.quantity, None);
        assert_eq!(updated.priority, NeedPriority::High);
        assert_eq!(updated.item, "Arroz 5kg");
        assert_eq!(updated.shelter_id, "s1");
    }
}
