//! Cache lifetimes for the public read operations.

use std::time::Duration;

/// Per-operation cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Shelter search results.
    pub list: Duration,
    /// Single shelter lookups.
    pub detail: Duration,
    /// Distinct city list.
    pub cities: Duration,
    /// Urgent needs aggregate.
    pub urgent: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            list: Duration::from_secs(60),
            detail: Duration::from_secs(60),
            cities: Duration::from_secs(300),
            urgent: Duration::from_secs(120),
        }
    }
}

impl CacheTtls {
    /// Reads `CACHE_TTL_LIST_SECS`, `CACHE_TTL_DETAIL_SECS`,
    /// `CACHE_TTL_CITIES_SECS` and `CACHE_TTL_URGENT_SECS`, falling back to
    /// the defaults for unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            list: env_secs("CACHE_TTL_LIST_SECS", defaults.list),
            detail: env_secs("CACHE_TTL_DETAIL_SECS", defaults.detail),
            cities: env_secs("CACHE_TTL_CITIES_SECS", defaults.cities),
            urgent: env_secs("CACHE_TTL_URGENT_SECS", defaults.urgent),
        }
    }

    /// Lifetimes of zero, so every read goes to the store.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            list: Duration::ZERO,
            detail: Duration::ZERO,
            cities: Duration::ZERO,
            urgent: Duration::ZERO,
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Duration::from_secs).unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {name}={raw}, using {}s", default.as_secs());
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operation_lifetimes() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.list.as_secs(), 60);
        assert_eq!(ttls.detail.as_secs(), 60);
        assert_eq!(ttls.cities.as_secs(), 300);
        assert_eq!(ttls.urgent.as_secs(), 120);
    }

    #[test]
    fn unset_variable_uses_default() {
        let fallback = Duration::from_secs(42);
        assert_eq!(env_secs("SHELTER_MAP_TEST_UNSET_TTL", fallback), fallback);
    }
}
