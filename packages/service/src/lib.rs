#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shelter query service.
//!
//! The single entry point used by the HTTP layer. Public reads (search,
//! detail, cities, urgent needs) go through the [`ResultCache`]; panel
//! reads go straight to the store. Every successful write invalidates the
//! [`SHELTERS_DATA_TAG`] group before returning, so the next read observes
//! it.

pub mod config;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use shelter_map_cache::{CachePolicy, ResultCache, SHELTERS_DATA_TAG};
use shelter_map_database::{DbError, ShelterStore, compile};
use shelter_map_database_models::{Page, PageRequest, ShelterCriteria, ShelterDetail, ShelterSummary};
use shelter_map_needs::{UrgentNeedGroup, aggregate};
use shelter_map_shelter_models::{
    Location, Need, NeedInput, NeedPatch, ShelterInput, ShelterPatch, ValidationError,
};

pub use config::CacheTtls;

/// Errors returned by [`ShelterService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Storage failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Write rejected before persistence.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Serialize)]
struct SearchKey<'a> {
    criteria: &'a ShelterCriteria,
    page: PageRequest,
}

/// Read and write operations over shelters, donation points and needs.
pub struct ShelterService {
    store: Arc<dyn ShelterStore>,
    cache: Arc<ResultCache>,
    ttls: CacheTtls,
}

impl ShelterService {
    /// Creates a service over `store`, caching public reads in `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn ShelterStore>, cache: Arc<ResultCache>, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    /// Searches public listings.
    ///
    /// Returns one page of matching locations, most recently updated first,
    /// each with a preview of its most pressing active needs. A page past
    /// the end is empty but still reports the total.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the store cannot be read.
    pub async fn search_shelters(
        &self,
        criteria: &ShelterCriteria,
        request: PageRequest,
    ) -> Result<Page<ShelterSummary>, ServiceError> {
        let criteria = criteria.normalized();
        let key = SearchKey {
            criteria: &criteria,
            page: request,
        };
        let predicate = compile(&criteria);
        let store = Arc::clone(&self.store);

        Ok(self
            .cache
            .get_or_try_insert_with(
                "searchShelters",
                &key,
                CachePolicy::shelters_data(self.ttls.list),
                move || async move { store.search(&predicate, request).await },
            )
            .await?)
    }

    /// Looks up one location with all of its needs. `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the store cannot be read.
    pub async fn get_shelter(&self, id: &str) -> Result<Option<ShelterDetail>, ServiceError> {
        let store = Arc::clone(&self.store);
        let owned_id = id.to_string();

        Ok(self
            .cache
            .get_or_try_insert_with(
                "getShelter",
                id,
                CachePolicy::shelters_data(self.ttls.detail),
                move || async move { store.get_shelter(&owned_id).await },
            )
            .await?)
    }

    /// Lists distinct city names, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the store cannot be read.
    pub async fn list_cities(&self) -> Result<Vec<String>, ServiceError> {
        let store = Arc::clone(&self.store);

        Ok(self
            .cache
            .get_or_try_insert_with(
                "listCities",
                &(),
                CachePolicy::shelters_data(self.ttls.cities),
                move || async move { store.distinct_cities().await },
            )
            .await?)
    }

    /// Returns the ranked system-wide urgent needs.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the store cannot be read.
    pub async fn urgent_needs(&self) -> Result<Vec<UrgentNeedGroup>, ServiceError> {
        let store = Arc::clone(&self.store);

        Ok(self
            .cache
            .get_or_try_insert_with(
                "getUrgentNeeds",
                &(),
                CachePolicy::shelters_data(self.ttls.urgent),
                move || async move {
                    let rows = store.active_needs().await?;
                    Ok::<_, DbError>(aggregate(&rows))
                },
            )
            .await?)
    }

    /// Panel listing. Only `search`, `city` and `status` are honored; other
    /// criteria are ignored. Never cached.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the store cannot be read.
    pub async fn list_managed(
        &self,
        criteria: &ShelterCriteria,
        request: PageRequest,
    ) -> Result<Page<Location>, ServiceError> {
        let criteria = ShelterCriteria {
            search: criteria.search.clone(),
            city: criteria.city.clone(),
            status: criteria.status,
            ..ShelterCriteria::default()
        }
        .normalized();

        Ok(self
            .store
            .list_locations(&compile(&criteria), request)
            .await?)
    }

    /// Lists every need of a location for the panel, `None` when the
    /// location does not exist. Never cached.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the store cannot be read.
    pub async fn list_needs(&self, shelter_id: &str) -> Result<Option<Vec<Need>>, ServiceError> {
        Ok(self
            .store
            .get_shelter(shelter_id)
            .await?
            .map(|detail| detail.needs))
    }

    /// Validates and stores a new location.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::Validation`] if the input breaks an invariant
    /// * [`ServiceError::Db`] if the write fails
    pub async fn create_shelter(&self, input: ShelterInput) -> Result<Location, ServiceError> {
        let location = input.into_location(new_id(), Utc::now())?;
        self.store.insert_location(&location).await?;
        self.invalidate().await;

        log::info!("Created {} {}", location.location_type(), location.id);
        Ok(location)
    }

    /// Merges `patch` into a stored location. `None` when it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::Validation`] if the merged record breaks an
    ///   invariant, e.g. occupancy above capacity; nothing is written
    /// * [`ServiceError::Db`] if the read or write fails
    pub async fn update_shelter(
        &self,
        id: &str,
        patch: &ShelterPatch,
    ) -> Result<Option<Location>, ServiceError> {
        let Some(existing) = self.store.get_shelter(id).await? else {
            return Ok(None);
        };

        let updated = patch.apply(&existing.location, Utc::now())?;
        if !self.store.update_location(&updated).await? {
            return Ok(None);
        }
        self.invalidate().await;

        log::info!("Updated {} {id}", updated.location_type());
        Ok(Some(updated))
    }

    /// Deletes a location and its needs. `false` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the write fails.
    pub async fn delete_shelter(&self, id: &str) -> Result<bool, ServiceError> {
        let deleted = self.store.delete_location(id).await?;
        if deleted {
            self.invalidate().await;
            log::info!("Deleted location {id}");
        }
        Ok(deleted)
    }

    /// Validates and stores a new need for `shelter_id`. `None` when the
    /// location does not exist.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::Validation`] if the input breaks an invariant
    /// * [`ServiceError::Db`] if the write fails
    pub async fn create_need(
        &self,
        shelter_id: &str,
        input: NeedInput,
    ) -> Result<Option<Need>, ServiceError> {
        let need = input.into_need(new_id(), shelter_id.to_string(), Utc::now())?;
        if !self.store.insert_need(&need).await? {
            return Ok(None);
        }
        self.invalidate().await;

        log::info!("Created need {} for {shelter_id}", need.id);
        Ok(Some(need))
    }

    /// Merges `patch` into a stored need. `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::Validation`] if the merged need breaks an invariant
    /// * [`ServiceError::Db`] if the read or write fails
    pub async fn update_need(
        &self,
        id: &str,
        patch: &NeedPatch,
    ) -> Result<Option<Need>, ServiceError> {
        let Some(existing) = self.store.get_need(id).await? else {
            return Ok(None);
        };

        let updated = patch.apply(&existing, Utc::now())?;
        if !self.store.update_need(&updated).await? {
            return Ok(None);
        }
        self.invalidate().await;

        log::info!("Updated need {id}");
        Ok(Some(updated))
    }

    /// Deletes a need. `false` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Db`] if the write fails.
    pub async fn delete_need(&self, id: &str) -> Result<bool, ServiceError> {
        let deleted = self.store.delete_need(id).await?;
        if deleted {
            self.invalidate().await;
            log::info!("Deleted need {id}");
        }
        Ok(deleted)
    }

    async fn invalidate(&self) {
        self.cache.invalidate_tag(SHELTERS_DATA_TAG).await;
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
