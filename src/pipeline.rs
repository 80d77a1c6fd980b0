//! End-to-end loading: fetch, parse, optionally enrich.
//!
//! Nothing here returns an error. A source that cannot be loaded is logged
//! once and yields an empty [`Dataset`]; rows that fail validation are
//! counted in the [`DropTally`].

use serde::Serialize;
use tracing::{error, info};

use crate::enrich::Enricher;
use crate::fetch::{HttpClient, load_source};
use crate::geocode::Geocoder;
use crate::parser::{Schema, parse_rows};
use crate::stats::DropTally;
use crate::types::{DataPoint, DropReason, RawRecord};

/// Validated points from one source, plus why the other rows were dropped.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Dataset {
    pub points: Vec<DataPoint>,
    pub tally: DropTally,
}

impl Dataset {
    fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Result<DataPoint, DropReason>>,
    {
        let mut dataset = Dataset::default();
        for row in rows {
            dataset.tally.record(&row);
            if let Ok(point) = row {
                dataset.points.push(point);
            }
        }
        dataset
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Parses already-loaded text without geocoding. Rows lacking coordinates are dropped.
pub fn collect_points(text: &str, schema: &Schema) -> Dataset {
    Dataset::from_rows(parse_rows(text, schema).map(|row| row.and_then(RawRecord::into_point)))
}

/// Parses already-loaded text, geocoding rows that lack coordinates.
pub async fn collect_enriched_points<G: Geocoder>(
    text: &str,
    schema: &Schema,
    enricher: &mut Enricher<G>,
) -> Dataset {
    let rows: Vec<_> = parse_rows(text, schema).collect();
    Dataset::from_rows(enricher.enrich(rows).await)
}

/// Loads `source` and parses it without geocoding.
#[tracing::instrument(skip(client, schema), fields(schema = schema.name))]
pub async fn load_points<C: HttpClient>(client: &C, source: &str, schema: &Schema) -> Dataset {
    let Some(text) = load_text(client, source).await else {
        return Dataset::default();
    };
    let dataset = collect_points(&text, schema);
    log_summary(&dataset);
    dataset
}

/// Loads `source`, parses it, and geocodes rows through `enricher`.
#[tracing::instrument(skip(client, schema, enricher), fields(schema = schema.name))]
pub async fn load_enriched_points<C: HttpClient, G: Geocoder>(
    client: &C,
    source: &str,
    schema: &Schema,
    enricher: &mut Enricher<G>,
) -> Dataset {
    let Some(text) = load_text(client, source).await else {
        return Dataset::default();
    };
    let dataset = collect_enriched_points(&text, schema, enricher).await;
    log_summary(&dataset);
    dataset
}

async fn load_text<C: HttpClient>(client: &C, source: &str) -> Option<String> {
    match load_source(client, source).await {
        Ok(text) => Some(text),
        Err(e) => {
            error!(source, error = %format!("{e:#}"), "Failed to load dataset");
            None
        }
    }
}

fn log_summary(dataset: &Dataset) {
    info!(
        accepted = dataset.tally.accepted,
        rejected = dataset.tally.rejected(),
        blank = dataset.tally.count("blank"),
        pct_accepted = dataset.tally.pct_accepted(),
        "Dataset parsed"
    );
}
