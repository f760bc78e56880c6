//! In-process [`ShelterStore`] used by tests and `SHELTER_STORE=memory`.
//!
//! Every operation takes the lock once, so a search observes a single
//! consistent snapshot just like the SQL store's combined statement.

use std::collections::BTreeMap;

use shelter_map_database_models::{
    ActiveNeedRow, NEED_PREVIEW_LIMIT, Page, PageRequest, Pagination, ShelterDetail,
    ShelterSummary,
};
use shelter_map_shelter_models::{Location, Need, NeedStatus, sort_needs_for_display};
use tokio::sync::RwLock;

use crate::DbError;
use crate::filter::Predicate;
use crate::store::ShelterStore;

#[derive(Debug, Default)]
struct Records {
    locations: BTreeMap<String, Location>,
    needs: BTreeMap<String, Need>,
}

impl Records {
    fn needs_by_location(&self) -> BTreeMap<&str, Vec<Need>> {
        let mut grouped: BTreeMap<&str, Vec<Need>> = BTreeMap::new();
        for need in self.needs.values() {
            grouped
                .entry(need.shelter_id.as_str())
                .or_default()
                .push(need.clone());
        }
        grouped
    }

    /// Matching locations, newest first, with their needs.
    fn matching(&self, predicate: &Predicate) -> Vec<(Location, Vec<Need>)> {
        let mut grouped = self.needs_by_location();
        let mut matched: Vec<(Location, Vec<Need>)> = self
            .locations
            .values()
            .filter_map(|location| {
                let needs = grouped.remove(location.id.as_str()).unwrap_or_default();
                predicate
                    .matches(location, &needs)
                    .then(|| (location.clone(), needs))
            })
            .collect();

        matched.sort_by(|(a, _), (b, _)| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        matched
    }
}

/// Shelter store holding every record in memory behind a [`RwLock`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `locations` and `needs`.
    ///
    /// Needs whose owning location is not present are discarded.
    #[must_use]
    pub fn with_records(locations: Vec<Location>, needs: Vec<Need>) -> Self {
        let locations: BTreeMap<String, Location> = locations
            .into_iter()
            .map(|location| (location.id.clone(), location))
            .collect();
        let needs = needs
            .into_iter()
            .filter(|need| locations.contains_key(&need.shelter_id))
            .map(|need| (need.id.clone(), need))
            .collect();

        Self {
            records: RwLock::new(Records { locations, needs }),
        }
    }

    fn page_slice<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
        let total = items.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = items
            .into_iter()
            .skip(offset)
            .take(request.page_size as usize)
            .collect();

        Page {
            items,
            pagination: Pagination::new(request, total),
        }
    }
}

#[async_trait::async_trait]
impl ShelterStore for MemoryStore {
    async fn search(
        &self,
        predicate: &Predicate,
        request: PageRequest,
    ) -> Result<Page<ShelterSummary>, DbError> {
        let matched = self.records.read().await.matching(predicate);

        Ok(Self::page_slice(matched, request).map(|(location, needs)| {
            let mut needs: Vec<Need> = needs
                .into_iter()
                .filter(|need| need.status == NeedStatus::Active)
                .collect();
            sort_needs_for_display(&mut needs);
            needs.truncate(NEED_PREVIEW_LIMIT);
            ShelterSummary { location, needs }
        }))
    }

    async fn list_locations(
        &self,
        predicate: &Predicate,
        request: PageRequest,
    ) -> Result<Page<Location>, DbError> {
        let matched = self.records.read().await.matching(predicate);

        Ok(Self::page_slice(matched, request).map(|(location, _)| location))
    }

    async fn get_shelter(&self, id: &str) -> Result<Option<ShelterDetail>, DbError> {
        let records = self.records.read().await;
        let Some(location) = records.locations.get(id) else {
            return Ok(None);
        };

        let mut needs: Vec<Need> = records
            .needs
            .values()
            .filter(|need| need.shelter_id == id)
            .cloned()
            .collect();
        sort_needs_for_display(&mut needs);

        Ok(Some(ShelterDetail {
            location: location.clone(),
            needs,
        }))
    }

    async fn distinct_cities(&self) -> Result<Vec<String>, DbError> {
        let records = self.records.read().await;
        let mut cities: Vec<String> = records
            .locations
            .values()
            .map(|location| location.city.clone())
            .collect();
        cities.sort();
        cities.dedup();
        Ok(cities)
    }

    async fn active_needs(&self) -> Result<Vec<ActiveNeedRow>, DbError> {
        let records = self.records.read().await;
        let mut active: Vec<&Need> = records
            .needs
            .values()
            .filter(|need| need.status == NeedStatus::Active)
            .collect();
        active.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(active
            .into_iter()
            .filter_map(|need| {
                let owner = records.locations.get(&need.shelter_id)?;
                Some(ActiveNeedRow {
                    category: need.category.clone(),
                    item: need.item.clone(),
                    unit: need.unit.clone(),
                    priority: need.priority,
                    quantity: need.quantity,
                    shelter_id: owner.id.clone(),
                    shelter_name: owner.name.clone(),
                })
            })
            .collect())
    }

    async fn insert_location(&self, location: &Location) -> Result<(), DbError> {
        let mut records = self.records.write().await;
        if records.locations.contains_key(&location.id) {
            return Err(DbError::Conversion {
                message: format!("Duplicate location id {}", location.id),
            });
        }
        records
            .locations
            .insert(location.id.clone(), location.clone());
        Ok(())
    }

    async fn update_location(&self, location: &Location) -> Result<bool, DbError> {
        let mut records = self.records.write().await;
        Ok(records
            .locations
            .get_mut(&location.id)
            .map(|stored| *stored = location.clone())
            .is_some())
    }

    async fn delete_location(&self, id: &str) -> Result<bool, DbError> {
        let mut records = self.records.write().await;
        if records.locations.remove(id).is_none() {
            return Ok(false);
        }
        records.needs.retain(|_, need| need.shelter_id != id);
        Ok(true)
    }

    async fn get_need(&self, id: &str) -> Result<Option<Need>, DbError> {
        Ok(self.records.read().await.needs.get(id).cloned())
    }

    async fn insert_need(&self, need: &Need) -> Result<bool, DbError> {
        let mut records = self.records.write().await;
        if !records.locations.contains_key(&need.shelter_id) {
            return Ok(false);
        }
        if records.needs.contains_key(&need.id) {
            return Err(DbError::Conversion {
                message: format!("Duplicate need id {}", need.id),
            });
        }
        records.needs.insert(need.id.clone(), need.clone());
        Ok(true)
    }

    async fn update_need(&self, need: &Need) -> Result<bool, DbError> {
        let mut records = self.records.write().await;
        Ok(records
            .needs
            .get_mut(&need.id)
            .map(|stored| *stored = need.clone())
            .is_some())
    }

    async fn delete_need(&self, id: &str) -> Result<bool, DbError> {
        Ok(self.records.write().await.needs.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _, Utc};
    use shelter_map_database_models::{PageLimits, ShelterCriteria};
    use shelter_map_shelter_models::{
        Coordinates, LocationKind, NeedPriority, Occupancy, ShelterStatus,
    };

    use super::*;
    use crate::filter::compile;

    fn location(id: &str, city: &str, minutes_ago: i64) -> Location {
        Location {
            id: id.to_string(),
            kind: LocationKind::Shelter(Occupancy {
                status: ShelterStatus::Open,
                capacity: 40,
                occupancy: 12,
            }),
            name: format!("Abrigo {id}"),
            city: city.to_string(),
            neighborhood: "Centro".to_string(),
            address: "Rua Halfeld, 100".to_string(),
            coordinates: Coordinates {
                lat: -21.76,
                lng: -43.35,
            },
            accessible: true,
            accepts_pets: false,
            public_contact: None,
            hours: None,
            notes: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap()
                - Duration::minutes(minutes_ago),
        }
    }

    fn need(id: &str, shelter_id: &str, priority: NeedPriority, status: NeedStatus) -> Need {
        Need {
            id: id.to_string(),
            shelter_id: shelter_id.to_string(),
            category: "Higiene".to_string(),
            item: format!("Item {id}"),
            priority,
            quantity: Some(10.0),
            unit: None,
            status,
            notes: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap(),
        }
    }

    fn request(page: i64, size: i64) -> PageRequest {
        PageRequest::new(Some(page), Some(size), PageLimits::PUBLIC)
    }

    #[tokio::test]
    async fn search_orders_newest_first_with_id_tiebreak() {
        let store = MemoryStore::with_records(
            vec![
                location("c", "Ubá", 5),
                location("b", "Ubá", 0),
                location("a", "Ubá", 0),
            ],
            vec![],
        );

        let page = store
            .search(&Predicate::always(), request(1, 10))
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|s| s.location.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn page_beyond_range_is_empty_with_total() {
        let store = MemoryStore::with_records(
            (0..5).map(|i| location(&format!("s{i}"), "Ubá", i)).collect(),
            vec![],
        );

        let page = store
            .search(&Predicate::always(), request(4, 2))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.page, 4);
    }

    #[tokio::test]
    async fn preview_holds_three_active_needs_by_priority() {
        let store = MemoryStore::with_records(
            vec![location("a", "Ubá", 0)],
            vec![
                need("n1", "a", NeedPriority::Low, NeedStatus::Active),
                need("n2", "a", NeedPriority::High, NeedStatus::Active),
                need("n3", "a", NeedPriority::High, NeedStatus::Fulfilled),
                need("n4", "a", NeedPriority::Med, NeedStatus::Active),
                need("n5", "a", NeedPriority::Low, NeedStatus::Active),
            ],
        );

        let page = store
            .search(&Predicate::always(), request(1, 8))
            .await
            .unwrap();
        let preview: Vec<&str> = page.items[0].needs.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(preview, ["n2", "n4", "n1"]);

        let detail = store.get_shelter("a").await.unwrap().unwrap();
        assert_eq!(detail.needs.len(), 5);
        assert_eq!(detail.needs[0].priority, NeedPriority::High);
    }

    #[tokio::test]
    async fn need_filter_counts_matching_locations() {
        let mut water = need("n1", "a", NeedPriority::High, NeedStatus::Active);
        water.category = "Água".to_string();
        let store = MemoryStore::with_records(
            vec![location("a", "Ubá", 0), location("b", "Ubá", 1)],
            vec![water],
        );

        let predicate = compile(&ShelterCriteria {
            needs: vec!["água".to_string()],
            ..ShelterCriteria::default()
        });
        let page = store.search(&predicate, request(1, 8)).await.unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0].location.id, "a");
    }

    #[tokio::test]
    async fn cities_are_distinct_and_sorted_case_sensitively() {
        let store = MemoryStore::with_records(
            vec![
                location("a", "Ubá", 0),
                location("b", "Juiz de Fora", 0),
                location("c", "Ubá", 0),
                location("d", "juiz de fora", 0),
            ],
            vec![],
        );

        assert_eq!(
            store.distinct_cities().await.unwrap(),
            ["Juiz de Fora", "Ubá", "juiz de fora"]
        );
    }

    #[tokio::test]
    async fn deleting_a_location_cascades_to_needs() {
        let store = MemoryStore::with_records(
            vec![location("a", "Ubá", 0)],
            vec![need("n1", "a", NeedPriority::High, NeedStatus::Active)],
        );

        assert!(store.delete_location("a").await.unwrap());
        assert!(!store.delete_location("a").await.unwrap());
        assert!(store.get_need("n1").await.unwrap().is_none());
        assert!(store.active_needs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn needs_require_an_existing_owner() {
        let store = MemoryStore::new();
        let orphan = need("n1", "missing", NeedPriority::Low, NeedStatus::Active);
        assert!(!store.insert_need(&orphan).await.unwrap());
        assert!(!store.update_need(&orphan).await.unwrap());
    }
}
