//! Geocoding enrichment for rows that carry no coordinates.
//!
//! Only rows in the aggregate demographic category are looked up; subsets are
//! dropped first to keep the number of external calls down. Lookups go
//! through a [`GeocodeCache`] owned by the [`Enricher`], so each distinct
//! `"subregion, region"` key reaches the provider at most once per successful
//! resolution.

use futures::{StreamExt, stream};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::geocode::{GeocodeCache, Geocoder};
use crate::types::{Coordinates, DataPoint, Demographics, DropReason, RawRecord, location_key};

/// Demographic value meaning "no sub-filtering applied".
pub const OVERALL: &str = "Overall";
pub const DEFAULT_COUNTRY: &str = "US";

/// Which demographic values qualify a row for geocoding. Compared exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub sex: String,
    pub race_ethnicity: String,
}

impl Default for Eligibility {
    fn default() -> Self {
        Self {
            sex: OVERALL.to_string(),
            race_ethnicity: OVERALL.to_string(),
        }
    }
}

impl Eligibility {
    pub fn allows(&self, demographics: &Demographics) -> bool {
        demographics.sex == self.sex && demographics.race_ethnicity == self.race_ethnicity
    }
}

pub struct Enricher<G> {
    geocoder: G,
    cache: GeocodeCache,
    eligibility: Eligibility,
    country: String,
    concurrency: usize,
}

impl<G: Geocoder> Enricher<G> {
    /// Sequential enricher with an empty cache, restricted to [`DEFAULT_COUNTRY`].
    pub fn new(geocoder: G) -> Self {
        Self {
            geocoder,
            cache: GeocodeCache::new(),
            eligibility: Eligibility::default(),
            country: DEFAULT_COUNTRY.to_string(),
            concurrency: 1,
        }
    }

    /// Reuses a cache from an earlier run.
    pub fn with_cache(mut self, cache: GeocodeCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// Maximum lookups in flight. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    pub fn into_cache(self) -> GeocodeCache {
        self.cache
    }

    /// Resolves one `(subregion, region)` pair, cache first.
    ///
    /// Misses and provider failures come back as [`DropReason`]s and are not
    /// cached, so a later call retries them.
    pub async fn resolve(
        &mut self,
        subregion: Option<&str>,
        region: &str,
    ) -> Result<Coordinates, DropReason> {
        let key = location_key(subregion, region);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "Geocode cache hit");
            return Ok(hit);
        }

        let outcome = lookup(&self.geocoder, &key, &self.country).await;
        if let Ok(coordinates) = &outcome {
            self.cache.insert(key, *coordinates);
        }
        outcome
    }

    /// Turns parsed rows into data points, geocoding rows that need it.
    ///
    /// Output order matches input order. Rows that already carry coordinates
    /// pass through untouched; parse failures are forwarded as-is. Distinct
    /// uncached keys are looked up once each, at most `concurrency` at a time.
    #[tracing::instrument(skip_all, fields(concurrency = self.concurrency, country = %self.country))]
    pub async fn enrich<I>(&mut self, rows: I) -> Vec<Result<DataPoint, DropReason>>
    where
        I: IntoIterator<Item = Result<RawRecord, DropReason>>,
    {
        let rows: Vec<_> = rows.into_iter().collect();

        let mut seen = HashSet::new();
        let pending: Vec<String> = rows
            .iter()
            .filter_map(|row| row.as_ref().ok())
            .filter(|record| self.needs_lookup(record))
            .map(RawRecord::location_key)
            .filter(|key| !self.cache.contains(key) && seen.insert(key.clone()))
            .collect();

        let cached_before = self.cache.len();
        let failures = self.lookup_all(pending).await;

        info!(
            resolved = self.cache.len() - cached_before,
            failed = failures.len(),
            cached = self.cache.len(),
            "Geocoding round complete"
        );

        rows.into_iter()
            .map(|row| {
                let mut record = row?;
                if record.coordinates.is_some() {
                    return record.into_point();
                }
                if !self.eligibility.allows(&record.demographics) {
                    return Err(DropReason::NotEligible);
                }
                if record.value.is_none() {
                    return Err(DropReason::InvalidValue);
                }

                let key = record.location_key();
                match self.cache.get(&key) {
                    Some(coordinates) => {
                        record.coordinates = Some(coordinates);
                        record.into_point()
                    }
                    None => Err(failures
                        .get(&key)
                        .cloned()
                        .unwrap_or(DropReason::GeocodeMiss(key))),
                }
            })
            .collect()
    }

    fn needs_lookup(&self, record: &RawRecord) -> bool {
        record.coordinates.is_none()
            && record.value.is_some()
            && self.eligibility.allows(&record.demographics)
    }

    /// Looks up every key, caching successes and returning the failures.
    ///
    /// With `concurrency == 1` each lookup completes before the next starts.
    async fn lookup_all(&mut self, keys: Vec<String>) -> HashMap<String, DropReason> {
        let geocoder = &self.geocoder;
        let country = self.country.as_str();

        let outcomes: Vec<(String, Result<Coordinates, DropReason>)> = stream::iter(keys)
            .map(|key| async move {
                let outcome = lookup(geocoder, &key, country).await;
                (key, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut failures = HashMap::new();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(coordinates) => self.cache.insert(key, coordinates),
                Err(reason) => {
                    failures.insert(key, reason);
                }
            }
        }
        failures
    }
}

async fn lookup<G: Geocoder + ?Sized>(
    geocoder: &G,
    key: &str,
    country: &str,
) -> Result<Coordinates, DropReason> {
    match geocoder.lookup(key, country).await {
        Ok(Some(coordinates)) => Ok(coordinates),
        Ok(None) => {
            debug!(key, "Geocoder returned no match");
            Err(DropReason::GeocodeMiss(key.to_string()))
        }
        Err(e) => {
            warn!(key, error = %e, "Geocode lookup failed");
            Err(DropReason::GeocodeFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
    }
}
