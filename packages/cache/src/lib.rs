#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-process result cache with per-entry TTLs and tag invalidation.
//!
//! Entries are keyed by an operation name plus the JSON serialization of
//! its parameters. `serde_json` objects keep their keys sorted, so
//! equivalent parameter sets always produce the same key.
//!
//! Every entry belongs to one or more tags. [`ResultCache::invalidate_tag`]
//! drops every entry carrying the tag and bumps the tag's generation; a
//! population that started before the bump is discarded instead of being
//! stored, so a write can never be masked by a read that raced it.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

/// Tag shared by every cached read over shelters and needs.
pub const SHELTERS_DATA_TAG: &str = "shelters-data";

const SHELTERS_DATA_TAGS: &[&str] = &[SHELTERS_DATA_TAG];

/// Default upper bound on stored entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// How long an operation's results live and which tags they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Time to live.
    pub ttl: Duration,
    /// Invalidation tags.
    pub tags: &'static [&'static str],
}

impl CachePolicy {
    /// A policy in the [`SHELTERS_DATA_TAG`] group.
    #[must_use]
    pub const fn shelters_data(ttl: Duration) -> Self {
        Self {
            ttl,
            tags: SHELTERS_DATA_TAGS,
        }
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
    tags: Vec<(String, u64)>,
    inserted: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    generations: HashMap<String, u64>,
    inserts: u64,
}

impl State {
    fn generation(&self, tag: &str) -> u64 {
        self.generations.get(tag).copied().unwrap_or(0)
    }

    fn is_current(&self, tags: &[(String, u64)]) -> bool {
        tags.iter()
            .all(|(tag, generation)| self.generation(tag) == *generation)
    }

    /// Frees room for one more entry: expired entries go first, then the
    /// oldest insertions.
    fn make_room(&mut self, max_entries: usize, now: Instant) {
        if self.entries.len() < max_entries {
            return;
        }
        self.entries.retain(|_, entry| entry.expires_at > now);
        while self.entries.len() >= max_entries {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            log::trace!("Evicting {oldest}");
            self.entries.remove(&oldest);
        }
    }
}

/// Shared cache of read results. Create one per process and share it
/// behind an [`Arc`].
pub struct ResultCache {
    state: RwLock<State>,
    max_entries: usize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

/// Builds the cache key for `operation` called with `params`.
///
/// Returns `None` if the parameters cannot be serialized.
#[must_use]
pub fn cache_key<P: Serialize + ?Sized>(operation: &str, params: &P) -> Option<String> {
    match serde_json::to_value(params) {
        Ok(value) => Some(format!("{operation}:{value}")),
        Err(e) => {
            log::warn!("Not caching {operation}: failed to serialize parameters: {e}");
            None
        }
    }
}

impl ResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache holding at most `max_entries` entries (at
    /// least one).
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the cached result of `operation(params)` or computes, stores
    /// and returns it.
    ///
    /// Errors from `compute` are returned as-is and never cached. Concurrent
    /// misses for the same key each compute independently.
    ///
    /// # Errors
    ///
    /// Returns whatever error `compute` returns.
    pub async fn get_or_try_insert_with<P, T, E, F, Fut>(
        &self,
        operation: &str,
        params: &P,
        policy: CachePolicy,
        compute: F,
    ) -> Result<T, E>
    where
        P: Serialize + ?Sized,
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = cache_key(operation, params) else {
            return compute().await;
        };

        let tags = {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(&key) {
                if entry.expires_at > Instant::now() && state.is_current(&entry.tags) {
                    if let Some(value) = entry.value.downcast_ref::<T>() {
                        log::trace!("Cache hit for {key}");
                        return Ok(value.clone());
                    }
                }
            }
            policy
                .tags
                .iter()
                .map(|tag| ((*tag).to_string(), state.generation(tag)))
                .collect::<Vec<_>>()
        };

        log::trace!("Cache miss for {key}");
        let value = compute().await?;

        let now = Instant::now();
        let mut state = self.state.write().await;
        if !state.is_current(&tags) {
            log::debug!("Discarding result for {key}: invalidated while computing");
            return Ok(value);
        }
        if !state.entries.contains_key(&key) {
            state.make_room(self.max_entries, now);
        }
        state.inserts += 1;
        let inserted = state.inserts;
        state.entries.insert(
            key,
            Entry {
                value: Arc::new(value.clone()),
                expires_at: now.checked_add(policy.ttl).unwrap_or(now),
                tags,
                inserted,
            },
        );

        Ok(value)
    }

    /// Drops every entry tagged with `tag` and rejects any population of
    /// the tag that is still in flight.
    pub async fn invalidate_tag(&self, tag: &str) {
        let mut state = self.state.write().await;
        *state.generations.entry(tag.to_string()).or_insert(0) += 1;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| !entry.tags.iter().any(|(t, _)| t == tag));
        log::debug!(
            "Invalidated tag {tag}: dropped {} entries",
            before - state.entries.len()
        );
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const MINUTE: CachePolicy = CachePolicy::shelters_data(Duration::from_secs(60));

    async fn counted(
        cache: &ResultCache,
        calls: &AtomicUsize,
        params: &serde_json::Value,
        policy: CachePolicy,
    ) -> Result<usize, String> {
        cache
            .get_or_try_insert_with("op", params, policy, move || async move {
                Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .await
    }

    #[test]
    fn key_is_independent_of_field_order() {
        let a = serde_json::json!({ "page": 1, "city": "Ubá" });
        let b = serde_json::json!({ "city": "Ubá", "page": 1 });
        assert_eq!(cache_key("list", &a), cache_key("list", &b));
        assert_ne!(cache_key("list", &a), cache_key("cities", &a));
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let params = serde_json::json!({ "page": 1 });

        assert_eq!(counted(&cache, &calls, &params, MINUTE).await, Ok(1));
        assert_eq!(counted(&cache, &calls, &params, MINUTE).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let other = serde_json::json!({ "page": 2 });
        assert_eq!(counted(&cache, &calls, &other, MINUTE).await, Ok(2));
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let params = serde_json::json!({});
        let expired = CachePolicy::shelters_data(Duration::ZERO);

        assert_eq!(counted(&cache, &calls, &params, expired).await, Ok(1));
        assert_eq!(counted(&cache, &calls, &params, expired).await, Ok(2));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ResultCache::new();
        let params = serde_json::json!({});

        let failed: Result<u32, &str> = cache
            .get_or_try_insert_with("op", &params, MINUTE, || async { Err("down") })
            .await;
        assert_eq!(failed, Err("down"));
        assert!(cache.is_empty().await);

        let recovered: Result<u32, &str> = cache
            .get_or_try_insert_with("op", &params, MINUTE, || async { Ok(7) })
            .await;
        assert_eq!(recovered, Ok(7));
    }

    #[tokio::test]
    async fn invalidation_drops_tagged_entries() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let params = serde_json::json!({});
        let untagged = CachePolicy {
            ttl: Duration::from_secs(60),
            tags: &[],
        };

        counted(&cache, &calls, &params, MINUTE).await.unwrap();
        cache
            .get_or_try_insert_with("other", &params, untagged, || async {
                Ok::<_, String>(0_usize)
            })
            .await
            .unwrap();
        assert_eq!(cache.len().await, 2);

        cache.invalidate_tag(SHELTERS_DATA_TAG).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(counted(&cache, &calls, &params, MINUTE).await, Ok(2));
    }

    #[tokio::test]
    async fn full_cache_evicts_oldest_entries() {
        let cache = ResultCache::with_max_entries(2);
        let calls = AtomicUsize::new(0);
        let first = serde_json::json!({ "page": 1 });
        let second = serde_json::json!({ "page": 2 });
        let third = serde_json::json!({ "page": 3 });

        assert_eq!(counted(&cache, &calls, &first, MINUTE).await, Ok(1));
        assert_eq!(counted(&cache, &calls, &second, MINUTE).await, Ok(2));
        assert_eq!(counted(&cache, &calls, &third, MINUTE).await, Ok(3));
        assert_eq!(cache.len().await, 2);

        // Second and third are still cached, first was evicted.
        assert_eq!(counted(&cache, &calls, &third, MINUTE).await, Ok(3));
        assert_eq!(counted(&cache, &calls, &second, MINUTE).await, Ok(2));
        assert_eq!(counted(&cache, &calls, &first, MINUTE).await, Ok(4));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn full_cache_drops_expired_entries_first() {
        let cache = ResultCache::with_max_entries(2);
        let calls = AtomicUsize::new(0);
        let expired = CachePolicy::shelters_data(Duration::ZERO);
        let stale = serde_json::json!({ "page": 1 });
        let fresh = serde_json::json!({ "page": 2 });
        let next = serde_json::json!({ "page": 3 });

        counted(&cache, &calls, &fresh, MINUTE).await.unwrap();
        counted(&cache, &calls, &stale, expired).await.unwrap();
        counted(&cache, &calls, &next, MINUTE).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(counted(&cache, &calls, &fresh, MINUTE).await, Ok(1));
    }

    #[tokio::test]
    async fn population_racing_an_invalidation_is_discarded() {
        let cache = ResultCache::new();
        let params = serde_json::json!({});
        let writer = &cache;

        let value: Result<u32, String> = cache
            .get_or_try_insert_with("op", &params, MINUTE, move || async move {
                writer.invalidate_tag(SHELTERS_DATA_TAG).await;
                Ok(1)
            })
            .await;
        assert_eq!(value, Ok(1));
        assert!(cache.is_empty().await);
    }
}
