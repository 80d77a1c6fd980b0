//! Place-name to coordinate lookup.
//!
//! [`Geocoder`] is the async trait for a lookup provider.
//! [`GeocodeCache`] memoizes successful lookups by their exact query string.
//! [`MapboxGeocoder`] implements [`Geocoder`] against the Mapbox places API.

mod mapbox;

pub use mapbox::{DEFAULT_BASE_URL, MapboxGeocoder, parse_center};

use anyhow::Result;
use std::collections::HashMap;

use crate::types::Coordinates;

/// Resolves a free-text place name to its best-match coordinates.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns `Ok(None)` when the provider has no match, and `Err` for
    /// transport failures or responses that cannot be read.
    async fn lookup(&self, query: &str, country: &str) -> Result<Option<Coordinates>>;
}

/// Memo of resolved place names for one pipeline run or process.
///
/// Entries are added on successful lookups and never evicted.
#[derive(Debug, Default, Clone)]
pub struct GeocodeCache {
    entries: HashMap<String, Coordinates>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Coordinates> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, coordinates: Coordinates) {
        self.entries.insert(key.into(), coordinates);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_roundtrip() {
        let mut cache = GeocodeCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get("Austin, TX"), None);

        cache.insert("Austin, TX", Coordinates::new(30.27, -97.74));

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("Austin, TX"));
        assert_eq!(cache.get("Austin, TX"), Some(Coordinates::new(30.27, -97.74)));
    }

    #[test]
    fn test_cache_key_is_exact() {
        let mut cache = GeocodeCache::new();
        cache.insert("Austin, TX", Coordinates::new(30.27, -97.74));

        assert_eq!(cache.get("austin, tx"), None);
        assert_eq!(cache.get("Austin,TX"), None);
    }
}
