//! Consumption records and request parameters.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Formats accepted for naive timestamps, tried in order.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

// ============================================================================
// Frequency
// ============================================================================

/// Granularity of consumption readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    /// One reading per hour.
    #[default]
    Hourly,
    /// One reading per day.
    Daily,
}

impl Frequency {
    /// Query parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Hourly => "HOURLY",
            Frequency::Daily => "DAILY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HOURLY" => Ok(Frequency::Hourly),
            "DAILY" => Ok(Frequency::Daily),
            other => Err(CoreError::InvalidData(format!("unknown frequency: {other}"))),
        }
    }
}

// ============================================================================
// Invoice Mode
// ============================================================================

/// Invoice listing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceMode {
    /// Every invoice in the requested window.
    #[default]
    All,
    /// Unpaid invoices only.
    Debt,
}

impl InvoiceMode {
    /// Query parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceMode::All => "ALL",
            InvoiceMode::Debt => "DEBT",
        }
    }
}

// ============================================================================
// Consumption Record
// ============================================================================

/// A cumulative meter reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRecord {
    /// Time of the reading (provider wall-clock time).
    #[serde(with = "flexible_datetime")]
    pub datetime: NaiveDateTime,

    /// Cumulative volume in cubic meters.
    pub accumulated_consumption: f64,

    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConsumptionRecord {
    /// Creates a record with no extra fields.
    pub fn new(datetime: NaiveDateTime, accumulated_consumption: f64) -> Self {
        Self {
            datetime,
            accumulated_consumption,
            extra: Map::new(),
        }
    }
}

/// Returns the cumulative values of `records`, in the given order.
pub fn parse_consumptions(records: &[ConsumptionRecord]) -> Vec<f64> {
    records.iter().map(|r| r.accumulated_consumption).collect()
}

/// Parses a provider timestamp.
///
/// Accepts RFC 3339 (the offset is dropped, keeping wall-clock time),
/// naive ISO timestamps and bare dates (midnight).
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, CoreError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CoreError::InvalidDatetime(s.to_string()))
}

mod flexible_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_datetime(&raw).map_err(serde::de::Error::custom)
    }
}
