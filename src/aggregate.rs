//! Per-location aggregation of validated data points.
//!
//! Pure functions only: the same input in the same order always yields the
//! same summaries.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::types::{Coordinates, DataPoint, LocationSummary};

/// Caller-selected constraints. `None` or `"all"` leaves a dimension unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointFilter {
    /// Matches the region name, region code, or full location key.
    pub region: Option<String>,
    pub sex: Option<String>,
    pub race_ethnicity: Option<String>,
    pub period: Option<String>,
}

impl PointFilter {
    pub fn matches(&self, point: &DataPoint) -> bool {
        let region_ok = match constraint(&self.region) {
            None => true,
            Some(region) => {
                point.region_name == region
                    || point.region_code == region
                    || point.location_key() == region
            }
        };

        region_ok
            && constraint(&self.sex).is_none_or(|sex| point.demographics.sex == sex)
            && constraint(&self.race_ethnicity)
                .is_none_or(|race| point.demographics.race_ethnicity == race)
            && constraint(&self.period).is_none_or(|period| point.period == period)
    }
}

fn constraint(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

struct Group {
    location: String,
    total: f64,
    count: usize,
    coordinates: Coordinates,
}

/// Groups points by location key into summaries, in order of first appearance.
///
/// `average_value` is the plain mean rounded to the nearest integer. The
/// first point seen for a key supplies the coordinates.
pub fn aggregate_by_location<'a, I>(points: I) -> Vec<LocationSummary>
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for point in points {
        let key = point.location_key();
        match index.get(&key) {
            Some(&i) => {
                let group = &mut groups[i];
                group.total += point.value;
                group.count += 1;
                if group.coordinates != point.coordinates {
                    debug!(
                        location = %group.location,
                        kept = ?group.coordinates,
                        ignored = ?point.coordinates,
                        "Inconsistent coordinates for location"
                    );
                }
            }
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    location: key,
                    total: point.value,
                    count: 1,
                    coordinates: point.coordinates,
                });
            }
        }
    }

    groups
        .into_iter()
        .map(|g| LocationSummary {
            location: g.location,
            count: g.count,
            average_value: (g.total / g.count as f64).round() as i64,
            lat: g.coordinates.lat,
            lon: g.coordinates.lon,
        })
        .collect()
}

/// Highest average first, ties broken by location name; keeps the top `limit`.
pub fn rank_by_average(
    mut summaries: Vec<LocationSummary>,
    limit: Option<usize>,
) -> Vec<LocationSummary> {
    summaries.sort_by(|a, b| {
        b.average_value
            .cmp(&a.average_value)
            .then_with(|| a.location.cmp(&b.location))
    });
    if let Some(limit) = limit {
        summaries.truncate(limit);
    }
    summaries
}

/// Dimension offered as a filter dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Region,
    Sex,
    RaceEthnicity,
    Period,
}

/// Sorted distinct values of `dimension`, for populating filter choices.
pub fn distinct_values<'a, I>(points: I, dimension: Dimension) -> Vec<String>
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    points
        .into_iter()
        .map(|p| match dimension {
            Dimension::Region => p.region_name.as_str(),
            Dimension::Sex => p.demographics.sex.as_str(),
            Dimension::RaceEthnicity => p.demographics.race_ethnicity.as_str(),
            Dimension::Period => p.period.as_str(),
        })
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Headline figures shown above the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub locations: usize,
    pub points: usize,
    pub mean_average_value: i64,
}

pub fn overview(summaries: &[LocationSummary]) -> Overview {
    let averages: Vec<f64> = summaries.iter().map(|s| s.average_value as f64).collect();
    Overview {
        locations: summaries.len(),
        points: summaries.iter().map(|s| s.count).sum(),
        mean_average_value: mean(&averages).round() as i64,
    }
}

/// Filters, aggregates and ranks `points`.
///
/// The overview is taken before `limit` is applied, so it always describes
/// every matching location.
pub fn summarize<'a, I>(
    points: I,
    filter: &PointFilter,
    limit: Option<usize>,
) -> (Overview, Vec<LocationSummary>)
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    let summaries = aggregate_by_location(points.into_iter().filter(|p| filter.matches(p)));
    let headline = overview(&summaries);
    (headline, rank_by_average(summaries, limit))
}

/// Arithmetic mean. Returns 0.0 for empty input.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Demographics;

    fn point(region: &str, value: f64) -> DataPoint {
        DataPoint {
            period: "2019".to_string(),
            region_code: region.to_string(),
            region_name: region.to_string(),
            subregion: None,
            geographic_level: None,
            location_id: None,
            value,
            value_unit: "per 100,000".to_string(),
            demographics: Demographics {
                sex: "Overall".to_string(),
                race_ethnicity: "Overall".to_string(),
            },
            coordinates: Coordinates::new(1.0, 2.0),
        }
    }

    #[test]
    fn test_aggregate_mean_and_count() {
        let points = vec![point("A", 10.0), point("A", 20.0), point("B", 5.0)];
        let summaries = aggregate_by_location(&points);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].location, "A");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].average_value, 15);
        assert_eq!(summaries[1].location, "B");
        assert_eq!(summaries[1].count, 1);
        assert_eq!(summaries[1].average_value, 5);
    }

    #[test]
    fn test_aggregate_rounds_to_nearest() {
        let points = vec![point("A", 10.0), point("A", 11.0)];
        assert_eq!(aggregate_by_location(&points)[0].average_value, 11);

        let points = vec![point("A", 10.0), point("A", 10.4)];
        assert_eq!(aggregate_by_location(&points)[0].average_value, 10);
    }

    #[test]
    fn test_aggregate_first_seen_coordinates_win() {
        let mut second = point("A", 20.0);
        second.coordinates = Coordinates::new(9.0, 9.0);
        let points = vec![point("A", 10.0), second];

        let summary = &aggregate_by_location(&points)[0];
        assert_eq!(summary.coordinates(), Coordinates::new(1.0, 2.0));
    }

    #[test]
    fn test_aggregate_groups_by_subregion_key() {
        let mut austin = point("TX", 10.0);
        austin.subregion = Some("Austin".to_string());
        let mut dallas = point("TX", 30.0);
        dallas.subregion = Some("Dallas".to_string());

        let summaries = aggregate_by_location(&[austin, dallas]);
        let names: Vec<_> = summaries.iter().map(|s| s.location.as_str()).collect();
        assert_eq!(names, vec!["Austin, TX", "Dallas, TX"]);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate_by_location(&Vec::<DataPoint>::new()).is_empty());
    }

    #[test]
    fn test_filter_constraints() {
        let mut male = point("Texas", 10.0);
        male.demographics.sex = "Male".to_string();
        let overall = point("Texas", 12.0);

        let filter = PointFilter {
            sex: Some("Male".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&male));
        assert!(!filter.matches(&overall));

        let all = PointFilter {
            region: Some("all".to_string()),
            sex: Some("ALL".to_string()),
            ..Default::default()
        };
        assert!(all.matches(&male));
        assert!(all.matches(&overall));

        let region = PointFilter {
            region: Some("Ohio".to_string()),
            ..Default::default()
        };
        assert!(!region.matches(&overall));
    }

    #[test]
    fn test_filter_then_aggregate() {
        let mut male = point("A", 100.0);
        male.demographics.sex = "Male".to_string();
        let points = vec![point("A", 10.0), male, point("A", 20.0)];
        let filter = PointFilter {
            sex: Some("Overall".to_string()),
            ..Default::default()
        };

        let summaries = aggregate_by_location(points.iter().filter(|p| filter.matches(p)));
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].average_value, 15);
    }

    #[test]
    fn test_rank_by_average() {
        let points = vec![
            point("A", 10.0),
            point("B", 30.0),
            point("C", 20.0),
            point("D", 30.0),
        ];
        let ranked = rank_by_average(aggregate_by_location(&points), Some(3));
        let names: Vec<_> = ranked.iter().map(|s| s.location.as_str()).collect();
        assert_eq!(names, vec!["B", "D", "C"]);

        let all = rank_by_average(aggregate_by_location(&points), None);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_distinct_values_sorted() {
        let mut male = point("Texas", 1.0);
        male.demographics.sex = "Male".to_string();
        let points = vec![point("Ohio", 1.0), male, point("Texas", 1.0)];

        assert_eq!(
            distinct_values(&points, Dimension::Region),
            vec!["Ohio", "Texas"]
        );
        assert_eq!(
            distinct_values(&points, Dimension::Sex),
            vec!["Male", "Overall"]
        );
    }

    #[test]
    fn test_overview() {
        let points = vec![point("A", 10.0), point("A", 20.0), point("B", 6.0)];
        let summaries = aggregate_by_location(&points);
        let o = overview(&summaries);

        assert_eq!(o.locations, 2);
        assert_eq!(o.points, 3);
        assert_eq!(o.mean_average_value, 11);
        assert_eq!(overview(&[]), Overview::default());
    }

    #[test]
    fn test_summarize_overview_ignores_top_limit() {
        let points = vec![
            point("A", 10.0),
            point("A", 20.0),
            point("B", 50.0),
            point("C", 30.0),
        ];

        let (headline, ranked) = summarize(&points, &PointFilter::default(), Some(1));

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].location, "B");
        assert_eq!(headline.locations, 3);
        assert_eq!(headline.points, 4);
        assert_eq!(headline.mean_average_value, 32);
    }
}
