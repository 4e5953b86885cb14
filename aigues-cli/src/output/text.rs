//! Text output formatting with colors.

use aigues_core::{ConsumptionRecord, Contract, Profile, StatisticSummary, UNIT_CUBIC_METERS};
use aigues_store::{MeterReading, UpdateOutcome};
use serde_json::Value;

use super::json::skip_reason;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Formats a contract listing, one contract per line.
    pub fn format_contracts(&self, contracts: &[Contract]) -> String {
        if contracts.is_empty() {
            return self.dim("No contracts");
        }

        let mut lines = vec![self.bold("Contracts")];
        for contract in contracts {
            let status = contract
                .extra
                .get("assignationStatus")
                .and_then(Value::as_str)
                .map(|s| format!(" {}", self.dim(&format!("({s})"))))
                .unwrap_or_default();
            lines.push(format!("  {}{status}", self.cyan(contract.number())));
        }
        lines.join("\n")
    }

    /// Formats the profile's user data block.
    pub fn format_profile(&self, profile: &Profile) -> String {
        let Some(Value::Object(data)) = &profile.user_data else {
            return self.dim("No user data");
        };

        let mut lines = vec![self.bold("Profile")];
        for (key, value) in data {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            lines.push(format!("  {:<24} {value}", format!("{key}:")));
        }
        lines.join("\n")
    }

    /// Formats invoices. Each invoice is shown by its number, date and amount
    /// when present.
    pub fn format_invoices(&self, invoices: &[Value]) -> String {
        if invoices.is_empty() {
            return self.dim("No invoices");
        }

        let field = |invoice: &Value, names: &[&str]| {
            names
                .iter()
                .find_map(|name| invoice.get(*name))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "-".to_string())
        };

        let mut lines = vec![self.bold(&format!("Invoices ({})", invoices.len()))];
        for invoice in invoices {
            lines.push(format!(
                "  {:<20} {:<12} {}",
                field(invoice, &["invoiceNumber", "number"]),
                field(invoice, &["issueDate", "invoiceDate", "date"]),
                field(invoice, &["totalAmount", "amount"]),
            ));
        }
        lines.join("\n")
    }

    // ========================================================================
    // Consumptions
    // ========================================================================

    /// Formats readings with the change since the previous row.
    pub fn format_consumptions(&self, records: &[ConsumptionRecord]) -> String {
        if records.is_empty() {
            return self.dim("No readings");
        }

        let mut lines = vec![self.bold(&format!(
            "{:<16}  {:>12}  {:>10}",
            "Time", UNIT_CUBIC_METERS, "Change"
        ))];

        let mut previous: Option<f64> = None;
        for record in records {
            let delta = match previous {
                Some(prev) => self.color_for_delta(record.accumulated_consumption - prev),
                None => self.dim(&format!("{:>10}", "-")),
            };
            lines.push(format!(
                "{:<16}  {:>12.3}  {delta}",
                record.datetime.format(DATETIME_FORMAT),
                record.accumulated_consumption,
            ));
            previous = Some(record.accumulated_consumption);
        }

        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            let total = last.accumulated_consumption - first.accumulated_consumption;
            lines.push(self.dim(&format!("Total: {total:.3} {UNIT_CUBIC_METERS}")));
        }
        lines.join("\n")
    }

    /// Formats a meter reading.
    pub fn format_reading(&self, reading: &MeterReading) -> String {
        let value = match reading.value {
            Some(v) => self.green(&format!("{v:.3} {}", reading.unit)),
            None => self.dim("unknown"),
        };
        let measured = reading
            .last_measure
            .map(|at| format!(" {}", self.dim(&format!("at {}", at.format(DATETIME_FORMAT)))))
            .unwrap_or_default();

        format!("{}: {value}{measured}", self.bold(&reading.name))
    }

    /// Formats the result of a polling cycle.
    pub fn format_outcome(&self, contract: &str, outcome: &UpdateOutcome) -> String {
        let status = match outcome {
            UpdateOutcome::Updated {
                backfilled_weeks: 0,
                ..
            } => self.green("updated"),
            UpdateOutcome::Updated {
                backfilled_weeks, ..
            } => self.green(&format!("updated, {backfilled_weeks} weeks backfilled")),
            UpdateOutcome::Skipped(reason) => {
                self.yellow(&format!("skipped ({})", skip_reason(*reason)))
            }
            UpdateOutcome::Errored(message) => self.red(&format!("error: {message}")),
        };
        format!("{}: {status}", self.cyan(contract))
    }

    /// Formats an authentication failure for a contract.
    pub fn format_auth_required(&self, contract: &str, reason: &str) -> String {
        format!(
            "{}: {}\n  Run `aigues token <TOKEN>` with a token from the customer area.",
            self.cyan(contract),
            self.red(&format!("authentication required ({reason})")),
        )
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Formats the stored series catalog.
    pub fn format_stats(&self, summaries: &[StatisticSummary]) -> String {
        if summaries.is_empty() {
            return self.dim("No statistics stored");
        }

        let mut lines = vec![self.bold(&format!(
            "{:<32} {:>7}  {:<16}  {:>12}",
            "Series", "Points", "Last", "Sum"
        ))];
        for summary in summaries {
            let last = summary
                .last_start
                .map(|at| at.format(DATETIME_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string());
            let sum = summary
                .last_sum
                .map(|s| format!("{s:.3} {}", summary.unit_of_measurement))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "{:<32} {:>7}  {last:<16}  {sum:>12}",
                summary.statistic_id, summary.points
            ));
        }
        lines.join("\n")
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Formats a success line.
    pub fn format_success(&self, message: &str) -> String {
        format!("{} {message}", self.green("✓"))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn color_for_delta(&self, delta: f64) -> String {
        let text = format!("{delta:>+10.3}");
        if delta < 0.0 {
            self.red(&text)
        } else if delta.abs() < f64::EPSILON {
            self.dim(&text)
        } else {
            text
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}
