//! Record types shared by the parser, enrichment and aggregation stages.

use serde::Serialize;
use thiserror::Error;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Demographic stratification of a measurement.
///
/// The same strings drive the filter dropdowns, so they are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Demographics {
    pub sex: String,
    pub race_ethnicity: String,
}

/// One source row mapped through a [`Schema`](crate::parser::Schema), before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub period: String,
    pub region_code: String,
    pub region_name: String,
    pub subregion: Option<String>,
    pub geographic_level: Option<String>,
    pub location_id: Option<String>,
    pub value: Option<f64>,
    pub value_unit: String,
    pub demographics: Demographics,
    pub coordinates: Option<Coordinates>,
}

impl RawRecord {
    /// Key used for geocode lookups and aggregation grouping.
    pub fn location_key(&self) -> String {
        location_key(self.subregion.as_deref(), &self.region_name)
    }

    /// Validates the record into a [`DataPoint`].
    ///
    /// # Errors
    ///
    /// [`DropReason::InvalidValue`] when the measurement is absent and
    /// [`DropReason::MissingCoordinates`] when no coordinates are known.
    pub fn into_point(self) -> Result<DataPoint, DropReason> {
        let value = self.value.ok_or(DropReason::InvalidValue)?;
        let coordinates = self.coordinates.ok_or(DropReason::MissingCoordinates)?;

        Ok(DataPoint {
            period: self.period,
            region_code: self.region_code,
            region_name: self.region_name,
            subregion: self.subregion,
            geographic_level: self.geographic_level,
            location_id: self.location_id,
            value,
            value_unit: self.value_unit,
            demographics: self.demographics,
            coordinates,
        })
    }
}

/// A validated, located measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub period: String,
    pub region_code: String,
    pub region_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subregion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographic_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub value: f64,
    pub value_unit: String,
    pub demographics: Demographics,
    pub coordinates: Coordinates,
}

impl DataPoint {
    pub fn location_key(&self) -> String {
        location_key(self.subregion.as_deref(), &self.region_name)
    }
}

/// Per-location aggregate handed to chart and map renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSummary {
    pub location: String,
    pub count: usize,
    pub average_value: i64,
    pub lat: f64,
    pub lon: f64,
}

impl LocationSummary {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// Why a source row did not become a [`DataPoint`].
///
/// None of these are failures of the run; they are counted and the row is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DropReason {
    #[error("blank line")]
    Blank,

    #[error("expected at least {required} fields, found {found}")]
    TooFewFields { found: usize, required: usize },

    #[error("data value is missing or not a finite number")]
    InvalidValue,

    #[error("no coordinates in source row")]
    MissingCoordinates,

    #[error("demographic subset is not eligible for geocoding")]
    NotEligible,

    #[error("geocoder returned no match for '{0}'")]
    GeocodeMiss(String),

    #[error("geocode lookup for '{key}' failed: {message}")]
    GeocodeFailed { key: String, message: String },
}

impl DropReason {
    /// Stable label used when tallying drops.
    pub fn kind(&self) -> &'static str {
        match self {
            DropReason::Blank => "blank",
            DropReason::TooFewFields { .. } => "too_few_fields",
            DropReason::InvalidValue => "invalid_value",
            DropReason::MissingCoordinates => "missing_coordinates",
            DropReason::NotEligible => "not_eligible",
            DropReason::GeocodeMiss(_) => "geocode_miss",
            DropReason::GeocodeFailed { .. } => "geocode_failed",
        }
    }
}

/// `"subregion, region"` when a subregion is known, otherwise the region alone.
pub fn location_key(subregion: Option<&str>, region: &str) -> String {
    match subregion {
        Some(sub) if !sub.is_empty() => format!("{sub}, {region}"),
        _ => region.to_string(),
    }
}
