//! Compiles shelter search criteria into a predicate tree.
//!
//! A [`Predicate`] is a plain boolean expression over a location and its
//! needs. The SQL store renders it into a parameterized `WHERE` clause; the
//! in-memory store evaluates it directly. Both must agree, so every
//! variant documents its semantics once here.

use std::fmt::Write as _;

use shelter_map_database_models::ShelterCriteria;
use shelter_map_shelter_models::terms::normalize_terms;
use shelter_map_shelter_models::{Location, LocationType, Need, NeedStatus, ShelterStatus};
use switchy_database::DatabaseValue;

/// Text column of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    /// Display name.
    Name,
    /// Neighborhood.
    Neighborhood,
    /// City.
    City,
}

impl LocationField {
    const fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Neighborhood => "neighborhood",
            Self::City => "city",
        }
    }

    fn value(self, location: &Location) -> &str {
        match self {
            Self::Name => &location.name,
            Self::Neighborhood => &location.neighborhood,
            Self::City => &location.city,
        }
    }
}

/// Text column of a need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeedField {
    /// Category.
    Category,
    /// Item description.
    Item,
}

impl NeedField {
    const fn column(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Item => "item",
        }
    }

    fn value(self, need: &Need) -> &str {
        match self {
            Self::Category => &need.category,
            Self::Item => &need.item,
        }
    }
}

/// Boolean expression over a single need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeedPredicate {
    /// True when any child is true.
    Or(Vec<Self>),
    /// Case-insensitive substring match.
    Contains {
        /// Column to search.
        field: NeedField,
        /// Substring to look for.
        needle: String,
    },
}

/// Boolean expression over a location and its needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// True when every child is true. An empty list is always true.
    And(Vec<Self>),
    /// True when any child is true. An empty list is always false.
    Or(Vec<Self>),
    /// Case-insensitive substring match.
    Contains {
        /// Column to search.
        field: LocationField,
        /// Substring to look for.
        needle: String,
    },
    /// Case-insensitive equality.
    EqualsIgnoreCase {
        /// Column to compare.
        field: LocationField,
        /// Expected value.
        value: String,
    },
    /// Exact shelter status. Never matches donation points.
    Status(ShelterStatus),
    /// Exact accessibility flag.
    Accessible(bool),
    /// Exact pet flag.
    AcceptsPets(bool),
    /// Exact location type.
    LocationType(LocationType),
    /// The location has at least one `ACTIVE` need matching the inner
    /// predicate.
    HasActiveNeed(NeedPredicate),
}

impl Predicate {
    /// The predicate that matches everything.
    #[must_use]
    pub const fn always() -> Self {
        Self::And(Vec::new())
    }

    /// Evaluates the predicate against a location and the needs it owns.
    #[must_use]
    pub fn matches(&self, location: &Location, needs: &[Need]) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.matches(location, needs)),
            Self::Or(children) => children.iter().any(|c| c.matches(location, needs)),
            Self::Contains { field, needle } => {
                contains_ignore_case(field.value(location), needle)
            }
            Self::EqualsIgnoreCase { field, value } => {
                field.value(location).to_lowercase() == value.to_lowercase()
            }
            Self::Status(status) => location.status() == Some(*status),
            Self::Accessible(flag) => location.accessible == *flag,
            Self::AcceptsPets(flag) => location.accepts_pets == *flag,
            Self::LocationType(location_type) => location.location_type() == *location_type,
            Self::HasActiveNeed(inner) => needs.iter().any(|need| {
                need.shelter_id == location.id
                    && need.status == NeedStatus::Active
                    && inner.matches(need)
            }),
        }
    }

    /// Renders the predicate as a SQL boolean expression over the
    /// `shelters` table aliased as `alias`, appending bound values to
    /// `params` and referencing them as `$n` placeholders.
    #[must_use]
    pub fn to_sql(&self, alias: &str, params: &mut Vec<DatabaseValue>) -> String {
        match self {
            Self::And(children) => {
                join_sql(children, " AND ", "1=1", |c, p| c.to_sql(alias, p), params)
            }
            Self::Or(children) => {
                join_sql(children, " OR ", "1=0", |c, p| c.to_sql(alias, p), params)
            }
            Self::Contains { field, needle } => {
                let placeholder = bind(params, like_pattern(needle));
                format!("LOWER({alias}.{}) LIKE {placeholder} ESCAPE '\\'", field.column())
            }
            Self::EqualsIgnoreCase { field, value } => {
                let placeholder = bind(params, value.to_lowercase());
                format!("LOWER({alias}.{}) = {placeholder}", field.column())
            }
            Self::Status(status) => {
                let placeholder = bind(params, status.to_string());
                format!("{alias}.status = {placeholder}")
            }
            Self::Accessible(flag) => {
                params.push(DatabaseValue::Bool(*flag));
                format!("{alias}.accessible = ${}", params.len())
            }
            Self::AcceptsPets(flag) => {
                params.push(DatabaseValue::Bool(*flag));
                format!("{alias}.accepts_pets = ${}", params.len())
            }
            Self::LocationType(location_type) => {
                let placeholder = bind(params, location_type.to_string());
                format!("{alias}.location_type = {placeholder}")
            }
            Self::HasActiveNeed(inner) => {
                let mut sql = format!(
                    "EXISTS (SELECT 1 FROM needs pn WHERE pn.shelter_id = {alias}.id AND pn.status = '{}'",
                    NeedStatus::Active
                );
                write!(sql, " AND {})", inner.to_sql("pn", params)).unwrap();
                sql
            }
        }
    }
}

impl NeedPredicate {
    /// Evaluates the predicate against a single need.
    #[must_use]
    pub fn matches(&self, need: &Need) -> bool {
        match self {
            Self::Or(children) => children.iter().any(|c| c.matches(need)),
            Self::Contains { field, needle } => contains_ignore_case(field.value(need), needle),
        }
    }

    /// Renders the predicate over the `needs` table aliased as `alias`.
    #[must_use]
    pub fn to_sql(&self, alias: &str, params: &mut Vec<DatabaseValue>) -> String {
        match self {
            Self::Or(children) => {
                join_sql(children, " OR ", "1=0", |c, p| c.to_sql(alias, p), params)
            }
            Self::Contains { field, needle } => {
                let placeholder = bind(params, like_pattern(needle));
                format!("LOWER({alias}.{}) LIKE {placeholder} ESCAPE '\\'", field.column())
            }
        }
    }
}

/// Translates search criteria into a conjunctive predicate.
///
/// Each supplied criterion becomes one conjunct; absent or empty criteria
/// are omitted, so empty criteria compile to [`Predicate::always`]. Need
/// terms outside the fixed vocabulary are dropped, and a term list with no
/// recognized terms imposes no constraint.
#[must_use]
pub fn compile(criteria: &ShelterCriteria) -> Predicate {
    let mut conjuncts = Vec::new();

    if let Some(search) = non_empty(criteria.search.as_deref()) {
        conjuncts.push(Predicate::Or(
            [
                LocationField::Name,
                LocationField::Neighborhood,
                LocationField::City,
            ]
            .into_iter()
            .map(|field| Predicate::Contains {
                field,
                needle: search.to_string(),
            })
            .collect(),
        ));
    }

    if let Some(city) = non_empty(criteria.city.as_deref()) {
        conjuncts.push(Predicate::EqualsIgnoreCase {
            field: LocationField::City,
            value: city.to_string(),
        });
    }

    if let Some(status) = criteria.status {
        conjuncts.push(Predicate::Status(status));
    }

    if let Some(accessible) = criteria.accessible {
        conjuncts.push(Predicate::Accessible(accessible));
    }

    if let Some(accepts_pets) = criteria.accepts_pets {
        conjuncts.push(Predicate::AcceptsPets(accepts_pets));
    }

    if criteria.donation_only == Some(true) {
        conjuncts.push(Predicate::LocationType(LocationType::DonationPoint));
    }

    let terms = normalize_terms(&criteria.needs);
    if !terms.is_empty() {
        conjuncts.push(Predicate::HasActiveNeed(NeedPredicate::Or(
            terms
                .iter()
                .flat_map(|term| {
                    [NeedField::Category, NeedField::Item].map(|field| NeedPredicate::Contains {
                        field,
                        needle: term.to_string(),
                    })
                })
                .collect(),
        )));
    }

    Predicate::And(conjuncts)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn bind(params: &mut Vec<DatabaseValue>, value: String) -> String {
    params.push(DatabaseValue::String(value));
    format!("${}", params.len())
}

fn join_sql<T>(
    children: &[T],
    separator: &str,
    empty: &str,
    render: impl Fn(&T, &mut Vec<DatabaseValue>) -> String,
    params: &mut Vec<DatabaseValue>,
) -> String {
    if children.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = children.iter().map(|c| render(c, params)).collect();
    format!("({})", parts.join(separator))
}

/// Builds a `LIKE` pattern that matches `needle` anywhere, with `%`, `_`
/// and `\` in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use shelter_map_shelter_models::{Coordinates, LocationKind, NeedPriority, Occupancy};

    use super::*;

    fn location(id: &str, name: &str, city: &str, kind: LocationKind) -> Location {
        Location {
            id: id.to_string(),
            kind,
            name: name.to_string(),
            city: city.to_string(),
            neighborhood: "São Pedro".to_string(),
            address: "Rua Principal, 10".to_string(),
            coordinates: Coordinates {
                lat: -21.7,
                lng: -43.4,
            },
            accessible: false,
            accepts_pets: true,
            public_contact: None,
            hours: None,
            notes: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap(),
        }
    }

    fn shelter(id: &str, name: &str, city: &str) -> Location {
        location(
            id,
            name,
            city,
            LocationKind::Shelter(Occupancy {
                status: ShelterStatus::Open,
                capacity: 50,
                occupancy: 10,
            }),
        )
    }

    fn need(shelter_id: &str, category: &str, item: &str, status: NeedStatus) -> Need {
        Need {
            id: format!("{shelter_id}-{item}"),
            shelter_id: shelter_id.to_string(),
            category: category.to_string(),
            item: item.to_string(),
            priority: NeedPriority::High,
            quantity: None,
            unit: None,
            status,
            notes: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_criteria_compile_to_always() {
        let predicate = compile(&ShelterCriteria::default());
        assert_eq!(predicate, Predicate::always());
        assert!(predicate.matches(&shelter("a", "Escola", "Ubá"), &[]));

        let mut params = Vec::new();
        assert_eq!(predicate.to_sql("s", &mut params), "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn search_matches_name_neighborhood_or_city() {
        let predicate = compile(&ShelterCriteria {
            search: Some("PEDRO".to_string()),
            ..ShelterCriteria::default()
        });
        assert!(predicate.matches(&shelter("a", "Escola", "Ubá"), &[]));

        let predicate = compile(&ShelterCriteria {
            search: Some("juiz".to_string()),
            ..ShelterCriteria::default()
        });
        assert!(predicate.matches(&shelter("a", "Escola", "Juiz de Fora"), &[]));
        assert!(!predicate.matches(&shelter("b", "Escola", "Ubá"), &[]));
    }

    #[test]
    fn city_is_case_insensitive_exact() {
        let predicate = compile(&ShelterCriteria {
            city: Some("JUIZ DE FORA".to_string()),
            ..ShelterCriteria::default()
        });
        assert!(predicate.matches(&shelter("a", "Escola", "Juiz de Fora"), &[]));
        assert!(!predicate.matches(&shelter("a", "Escola", "Juiz de Fora Norte"), &[]));
    }

    #[test]
    fn status_never_matches_donation_points() {
        let predicate = compile(&ShelterCriteria {
            status: Some(ShelterStatus::Open),
            ..ShelterCriteria::default()
        });
        assert!(predicate.matches(&shelter("a", "Escola", "Ubá"), &[]));
        assert!(!predicate.matches(
            &location("d", "Paróquia", "Ubá", LocationKind::DonationPoint),
            &[]
        ));
    }

    #[test]
    fn boolean_flags_only_apply_when_set() {
        let place = shelter("a", "Escola", "Ubá");
        let accessible = compile(&ShelterCriteria {
            accessible: Some(true),
            ..ShelterCriteria::default()
        });
        assert!(!accessible.matches(&place, &[]));

        let not_accessible = compile(&ShelterCriteria {
            accessible: Some(false),
            accepts_pets: Some(true),
            ..ShelterCriteria::default()
        });
        assert!(not_accessible.matches(&place, &[]));
    }

    #[test]
    fn donation_only_false_is_no_constraint() {
        let predicate = compile(&ShelterCriteria {
            donation_only: Some(false),
            ..ShelterCriteria::default()
        });
        assert_eq!(predicate, Predicate::always());

        let predicate = compile(&ShelterCriteria {
            donation_only: Some(true),
            ..ShelterCriteria::default()
        });
        assert!(!predicate.matches(&shelter("a", "Escola", "Ubá"), &[]));
        assert!(predicate.matches(
            &location("d", "Paróquia", "Ubá", LocationKind::DonationPoint),
            &[]
        ));
    }

    #[test]
    fn need_terms_require_an_active_matching_need() {
        let place = shelter("a", "Escola", "Ubá");
        let predicate = compile(&ShelterCriteria {
            needs: vec!["Remédios".to_string(), "roupas".to_string()],
            ..ShelterCriteria::default()
        });

        let paused = [need("a", "Remédios", "Analgésicos", NeedStatus::Paused)];
        assert!(!predicate.matches(&place, &paused));

        let active = [need("a", "Saúde", "Remédios infantis", NeedStatus::Active)];
        assert!(predicate.matches(&place, &active));

        let other_shelter = [need("b", "Remédios", "Analgésicos", NeedStatus::Active)];
        assert!(!predicate.matches(&place, &other_shelter));
    }

    #[test]
    fn only_invalid_terms_behave_like_no_terms() {
        let predicate = compile(&ShelterCriteria {
            needs: vec!["roupas".to_string(), String::new()],
            ..ShelterCriteria::default()
        });
        assert_eq!(predicate, compile(&ShelterCriteria::default()));
    }

    #[test]
    fn renders_parameterized_sql() {
        let predicate = compile(&ShelterCriteria {
            search: Some("50%".to_string()),
            status: Some(ShelterStatus::Full),
            accepts_pets: Some(false),
            needs: vec!["água".to_string()],
            ..ShelterCriteria::default()
        });
        let mut params = Vec::new();
        let sql = predicate.to_sql("s", &mut params);

        assert_eq!(
            sql,
            "((LOWER(s.name) LIKE $1 ESCAPE '\\' OR LOWER(s.neighborhood) LIKE $2 ESCAPE '\\' \
             OR LOWER(s.city) LIKE $3 ESCAPE '\\') AND s.status = $4 AND s.accepts_pets = $5 \
             AND EXISTS (SELECT 1 FROM needs pn WHERE pn.shelter_id = s.id AND pn.status = 'ACTIVE' \
             AND (LOWER(pn.category) LIKE $6 ESCAPE '\\' OR LOWER(pn.item) LIKE $7 ESCAPE '\\')))"
        );
        assert_eq!(params.len(), 7);
        assert!(matches!(&params[0], DatabaseValue::String(p) if p == "%50\\%%"));
        assert!(matches!(&params[3], DatabaseValue::String(p) if p == "FULL"));
        assert!(matches!(params[4], DatabaseValue::Bool(false)));
        assert!(matches!(&params[5], DatabaseValue::String(p) if p == "%água%"));
    }
}
