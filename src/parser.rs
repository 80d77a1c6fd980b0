//! Delimited-text parser for CDC cardiovascular datasets.
//!
//! Rows come out as `Result<RawRecord, DropReason>` so callers can count why
//! rows were skipped; [`parse_points`] keeps only the rows that validate.

use anyhow::{Result, bail};
use tracing::{debug, warn};

use crate::types::{Coordinates, DataPoint, Demographics, DropReason, RawRecord};

const SEPARATOR: char = ',';
const QUOTE: char = '"';

/// Column layout of a dataset variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    /// Rows with fewer fields are skipped.
    pub min_columns: usize,
    pub period: usize,
    pub region_code: usize,
    pub region_name: usize,
    pub subregion: Option<usize>,
    pub geographic_level: Option<usize>,
    pub location_id: Option<usize>,
    pub value: usize,
    pub value_unit: usize,
    pub sex: usize,
    pub race_ethnicity: usize,
    /// `(lat, lon)` columns, when the source carries coordinates.
    pub coordinates: Option<(usize, usize)>,
}

impl Schema {
    /// State-level extract with embedded coordinates.
    pub fn variant_a() -> Self {
        Self {
            name: "a",
            min_columns: 14,
            period: 0,
            region_code: 1,
            region_name: 2,
            subregion: None,
            geographic_level: Some(3),
            location_id: Some(11),
            value: 5,
            value_unit: 6,
            sex: 8,
            race_ethnicity: 10,
            coordinates: Some((12, 13)),
        }
    }

    /// City-level extract without coordinates; needs geocoding.
    pub fn variant_b() -> Self {
        Self {
            name: "b",
            min_columns: 7,
            period: 0,
            region_code: 1,
            region_name: 1,
            subregion: Some(2),
            geographic_level: None,
            location_id: None,
            value: 3,
            value_unit: 4,
            sex: 5,
            race_ethnicity: 6,
            coordinates: None,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Ok(Self::variant_a()),
            "b" => Ok(Self::variant_b()),
            other => bail!("unknown schema '{other}', expected 'a' or 'b'"),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinates.is_some()
    }
}

/// Splits one line into fields.
///
/// A double quote toggles literal mode; separators inside literal mode are
/// kept as text. Quote characters are not emitted and text on either side of
/// a quote joins the same field.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            QUOTE => in_quotes = !in_quotes,
            SEPARATOR if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    fields.push(current);
    fields
}

/// Lenient float parse: empty, unparsable and non-finite input all yield `None`.
pub fn parse_number(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Maps one non-header line through `schema`.
pub fn parse_line(line: &str, schema: &Schema) -> Result<RawRecord, DropReason> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DropReason::Blank);
    }

    let fields = split_fields(line);
    if fields.len() < schema.min_columns {
        return Err(DropReason::TooFewFields {
            found: fields.len(),
            required: schema.min_columns,
        });
    }

    let text = |i: usize| fields.get(i).cloned().unwrap_or_default();
    let optional = |i: Option<usize>| i.map(text);

    let coordinates = schema.coordinates.and_then(|(lat, lon)| {
        let lat = parse_number(fields.get(lat)?)?;
        let lon = parse_number(fields.get(lon)?)?;
        Some(Coordinates::new(lat, lon))
    });

    Ok(RawRecord {
        period: text(schema.period),
        region_code: text(schema.region_code),
        region_name: text(schema.region_name),
        subregion: optional(schema.subregion),
        geographic_level: optional(schema.geographic_level),
        location_id: optional(schema.location_id),
        value: fields.get(schema.value).and_then(|f| parse_number(f)),
        value_unit: text(schema.value_unit),
        demographics: Demographics {
            sex: text(schema.sex),
            race_ethnicity: text(schema.race_ethnicity),
        },
        coordinates,
    })
}

/// Lazily parses every line after the header.
///
/// The header is discarded by position. A header narrower than the schema is
/// logged since it usually means the source file changed shape.
pub fn parse_rows<'a>(
    text: &'a str,
    schema: &'a Schema,
) -> impl Iterator<Item = Result<RawRecord, DropReason>> + 'a {
    let mut lines = text.split('\n');

    if let Some(header) = lines.next() {
        let header = header.trim();
        let columns = split_fields(header).len();
        if !header.is_empty() && columns < schema.min_columns {
            warn!(
                schema = schema.name,
                columns,
                required = schema.min_columns,
                "Header has fewer columns than the schema expects"
            );
        }
    }

    lines.map(move |line| {
        let row = parse_line(line, schema);
        if let Err(reason) = &row {
            if !matches!(reason, DropReason::Blank) {
                debug!(reason = %reason, "Row skipped");
            }
        }
        row
    })
}

/// Lazily yields the rows that validate into [`DataPoint`]s, in source order.
pub fn parse_points<'a>(text: &'a str, schema: &'a Schema) -> impl Iterator<Item = DataPoint> + 'a {
    parse_rows(text, schema).filter_map(|row| row.and_then(RawRecord::into_point).ok())
}
