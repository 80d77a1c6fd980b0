//! CLI entry point for the cardiovascular dataset ingester.
//!
//! Loads a CDC extract from a file or URL, geocodes city-level rows when a
//! Mapbox token is configured, and prints data points, filter choices, or
//! ranked per-location summaries.

use anyhow::Result;
use cardio_ingest::{
    aggregate::{Dimension, Overview, PointFilter, distinct_values, summarize},
    config::Config,
    enrich::Enricher,
    fetch::BasicClient,
    geocode::MapboxGeocoder,
    output::{print_json, print_pretty, write_summaries},
    parser::Schema,
    pipeline::{Dataset, load_enriched_points, load_points},
    stats::DropTally,
    types::{DataPoint, LocationSummary},
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "cardio_ingest")]
#[command(about = "Parse, geocode and summarize CDC cardiovascular datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Path to file or URL to fetch
    #[arg(value_name = "FILE_OR_URL")]
    source: String,

    /// Column layout: "a" (state level, with coordinates) or "b" (city level)
    #[arg(short, long, default_value = "a")]
    schema: String,

    /// Only keep points for this region name, code, or location key
    #[arg(long)]
    region: Option<String>,

    /// Only keep points with this sex value ("all" for no constraint)
    #[arg(long)]
    sex: Option<String>,

    /// Only keep points with this race/ethnicity value ("all" for no constraint)
    #[arg(long)]
    race: Option<String>,

    /// Only keep points for this period (e.g. year)
    #[arg(long)]
    period: Option<String>,
}

impl SourceArgs {
    fn filter(&self) -> PointFilter {
        PointFilter {
            region: self.region.clone(),
            sex: self.sex.clone(),
            race_ethnicity: self.race.clone(),
            period: self.period.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the validated data points that match the filters
    Points {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List the values available for each filter
    Filters {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Aggregate matching points by location and rank by average value
    Summarize {
        #[command(flatten)]
        source: SourceArgs,

        /// Keep only the top N locations
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Optional: CSV file to write the ranked summaries to
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Serialize)]
struct FilterChoices {
    regions: Vec<String>,
    sexes: Vec<String>,
    races: Vec<String>,
    periods: Vec<String>,
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    generated_at: DateTime<Utc>,
    source: &'a str,
    overview: Overview,
    tally: &'a DropTally,
    locations: &'a [LocationSummary],
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = Path::new(&config.log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&config.log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("cardio_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Points { source } => {
            let dataset = load(&source, &config).await?;
            let filter = source.filter();
            let points: Vec<&DataPoint> = dataset
                .points
                .iter()
                .filter(|p| filter.matches(p))
                .collect();

            info!(
                matched = points.len(),
                total = dataset.points.len(),
                "Points selected"
            );
            print_json(&points)?;
        }
        Commands::Filters { source } => {
            let dataset = load(&source, &config).await?;
            let choices = FilterChoices {
                regions: distinct_values(&dataset.points, Dimension::Region),
                sexes: distinct_values(&dataset.points, Dimension::Sex),
                races: distinct_values(&dataset.points, Dimension::RaceEthnicity),
                periods: distinct_values(&dataset.points, Dimension::Period),
            };
            print_json(&choices)?;
        }
        Commands::Summarize {
            source,
            top,
            output,
        } => {
            let dataset = load(&source, &config).await?;
            let (headline, ranked) = summarize(&dataset.points, &source.filter(), top);

            if dataset.is_empty() {
                warn!(source = %source.source, "No data points; summary is empty");
            }

            let report = SummaryReport {
                generated_at: Utc::now(),
                source: &source.source,
                overview: headline,
                tally: &dataset.tally,
                locations: &ranked,
            };
            print_pretty(&dataset.tally);
            print_json(&report)?;

            if let Some(path) = output {
                write_summaries(&path, &ranked)?;
                info!(path = %path, rows = ranked.len(), "Summaries written");
            }
        }
    }

    Ok(())
}

/// Loads and parses the source, geocoding when the schema has no coordinates
/// and a token is configured.
#[tracing::instrument(skip_all, fields(source = %args.source, schema = %args.schema))]
async fn load(args: &SourceArgs, config: &Config) -> Result<Dataset> {
    let schema = Schema::from_name(&args.schema)?;
    let client = BasicClient::with_timeout(Duration::from_secs(60))?;

    if schema.has_coordinates() {
        return Ok(load_points(&client, &args.source, &schema).await);
    }

    match &config.mapbox_access_token {
        Some(token) => {
            let geocoder =
                MapboxGeocoder::new(token.clone(), Some(config.geocode_base_url.clone()))?;
            let mut enricher = Enricher::new(geocoder)
                .with_country(&config.geocode_country)
                .with_concurrency(config.geocode_concurrency);

            let dataset = load_enriched_points(&client, &args.source, &schema, &mut enricher).await;
            info!(cached = enricher.cache().len(), "Geocode cache size");
            Ok(dataset)
        }
        None => {
            warn!("MAPBOX_ACCESS_TOKEN not set; rows without coordinates will be dropped");
            Ok(load_points(&client, &args.source, &schema).await)
        }
    }
}
