//! Storage abstraction shared by the `PostgreSQL` and in-memory backends.

use shelter_map_database_models::{
    ActiveNeedRow, Page, PageRequest, ShelterDetail, ShelterSummary,
};
use shelter_map_shelter_models::{Location, Need};

use crate::DbError;
use crate::filter::Predicate;

/// Read and write access to shelters and their needs.
///
/// Every method is a single atomic unit against the backing store. In
/// particular the count and the page slice returned by
/// [`ShelterStore::search`] always come from the same snapshot.
#[async_trait::async_trait]
pub trait ShelterStore: Send + Sync {
    /// Returns one page of locations matching `predicate`, newest first
    /// (ties broken by id), each with up to
    /// [`shelter_map_database_models::NEED_PREVIEW_LIMIT`] active needs.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    async fn search(
        &self,
        predicate: &Predicate,
        request: PageRequest,
    ) -> Result<Page<ShelterSummary>, DbError>;

    /// Returns one page of locations matching `predicate` without needs.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    async fn list_locations(
        &self,
        predicate: &Predicate,
        request: PageRequest,
    ) -> Result<Page<Location>, DbError>;

    /// Returns a location with every need it owns, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    async fn get_shelter(&self, id: &str) -> Result<Option<ShelterDetail>, DbError>;

    /// Returns distinct city names, sorted, case-sensitive as stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    async fn distinct_cities(&self) -> Result<Vec<String>, DbError>;

    /// Returns every `ACTIVE` need system-wide with its owner's id and
    /// name, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    async fn active_needs(&self) -> Result<Vec<ActiveNeedRow>, DbError>;

    /// Inserts a new location.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn insert_location(&self, location: &Location) -> Result<(), DbError>;

    /// Replaces a stored location. Returns `false` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn update_location(&self, location: &Location) -> Result<bool, DbError>;

    /// Deletes a location and all its needs. Returns `false` when it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn delete_location(&self, id: &str) -> Result<bool, DbError>;

    /// Returns a single need, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    async fn get_need(&self, id: &str) -> Result<Option<Need>, DbError>;

    /// Inserts a need. Returns `false` when its owning location does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn insert_need(&self, need: &Need) -> Result<bool, DbError>;

    /// Replaces a stored need. Returns `false` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn update_need(&self, need: &Need) -> Result<bool, DbError>;

    /// Deletes a need. Returns `false` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn delete_need(&self, id: &str) -> Result<bool, DbError>;
}
