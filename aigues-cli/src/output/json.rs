//! JSON output formatting.

use aigues_store::{MeterReading, SkipReason, UpdateOutcome};
use anyhow::Result;
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for one refreshed contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutput {
    pub contract: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfilled_weeks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<MeterReading>,
}

impl RefreshOutput {
    /// Builds the output for a cycle result.
    pub fn new(contract: &str, outcome: &UpdateOutcome, reading: Option<MeterReading>) -> Self {
        let (name, detail, backfilled_weeks) = match outcome {
            UpdateOutcome::Updated {
                backfilled_weeks, ..
            } => ("updated", None, Some(*backfilled_weeks)),
            UpdateOutcome::Skipped(reason) => ("skipped", Some(skip_reason(*reason).to_string()), None),
            UpdateOutcome::Errored(message) => ("errored", Some(message.clone()), None),
        };

        Self {
            contract: contract.to_string(),
            outcome: name,
            detail,
            backfilled_weeks,
            reading,
        }
    }
}

/// Short description of a skip.
pub fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::TooEarly => "last reading is less than an hour old",
        SkipReason::NoData => "no readings available",
        SkipReason::InProgress => "a refresh is already running",
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Serializes any value.
    pub fn format<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}
