//! Statistic series types.
//!
//! A series is keyed by its statistic id and carries hour-aligned points.
//! Both `state` and `sum` of a point hold the cumulative meter value, so the
//! series accumulates monotonically.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Unit of every water series.
pub const UNIT_CUBIC_METERS: &str = "m³";

/// Source tag attached to imported series.
const DEFAULT_SOURCE: &str = "recorder";

/// Decimal digits kept for cumulative values.
const VOLUME_DECIMALS: i32 = 4;

/// Description of a statistic series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticMetadata {
    /// Series identifier.
    pub statistic_id: String,
    /// Unit of measurement.
    pub unit_of_measurement: String,
    /// Whether points carry a mean.
    pub has_mean: bool,
    /// Whether points carry a running sum.
    pub has_sum: bool,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source tag.
    pub source: String,
}

impl StatisticMetadata {
    /// Metadata for a cumulative cubic-meter series.
    pub fn cubic_meters(statistic_id: impl Into<String>) -> Self {
        Self {
            statistic_id: statistic_id.into(),
            unit_of_measurement: UNIT_CUBIC_METERS.to_string(),
            has_mean: false,
            has_sum: true,
            name: None,
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// A single hour-aligned point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticPoint {
    /// Start of the hour.
    pub start: NaiveDateTime,
    /// Point value.
    pub state: f64,
    /// Running total.
    pub sum: f64,
}

impl StatisticPoint {
    /// Builds a point from a cumulative reading: hour-aligned, rounded,
    /// with `state == sum`.
    pub fn cumulative(at: NaiveDateTime, value: f64) -> Self {
        let value = round_volume(value);
        Self {
            start: truncate_to_hour(at),
            state: value,
            sum: value,
        }
    }
}

/// Catalog entry for a stored series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticSummary {
    /// Series identifier.
    pub statistic_id: String,
    /// Unit of measurement.
    pub unit_of_measurement: String,
    /// Number of stored points.
    pub points: usize,
    /// Start of the latest point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_start: Option<NaiveDateTime>,
    /// Sum of the latest point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sum: Option<f64>,
}

/// Zeroes minutes, seconds and sub-seconds.
pub fn truncate_to_hour(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date()
        .and_hms_opt(dt.hour(), 0, 0)
        .unwrap_or(dt)
}

/// Rounds a volume to four decimal digits.
pub fn round_volume(value: f64) -> f64 {
    let factor = 10f64.powi(VOLUME_DECIMALS);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_datetime;

    #[test]
    fn test_truncate_to_hour() {
        let dt = parse_datetime("2024-03-01T10:59:59.999").unwrap();
        let truncated = truncate_to_hour(dt);
        assert_eq!(truncated, parse_datetime("2024-03-01T10:00:00").unwrap());
        assert_eq!(truncated.nanosecond(), 0);
    }

    #[test]
    fn test_round_volume() {
        assert_eq!(round_volume(123.456_789_123_4), 123.4568);
        assert_eq!(round_volume(0.1 + 0.2), 0.3);
    }

    #[test]
    fn test_round_volume_idempotent() {
        for value in [0.0, 1.23456, 98765.43219, 0.000_05, 42.1] {
            let once = round_volume(value);
            assert_eq!(round_volume(once), once);
        }
    }

    #[test]
    fn test_cumulative_point() {
        let dt = parse_datetime("2024-03-01T10:30:00").unwrap();
        let point = StatisticPoint::cumulative(dt, 12.345_678_9);
        assert_eq!(point.state, 12.3457);
        assert_eq!(point.sum, point.state);
        assert_eq!(point.start.minute(), 0);
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = StatisticMetadata::cubic_meters("sensor.contador_w1");
        assert!(meta.has_sum);
        assert!(!meta.has_mean);
        assert_eq!(meta.unit_of_measurement, UNIT_CUBIC_METERS);
    }
}
