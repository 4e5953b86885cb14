//! CLI output formatting tests.

mod text_formatter_tests {
    use super::super::text::TextFormatter;
    use aigues_core::{ConsumptionRecord, Contract, StatisticSummary};
    use aigues_store::{ContractState, MeterReading, SkipReason, UpdateOutcome};
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(day: u32, hour: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_consumptions_show_deltas_and_total() {
        let formatter = TextFormatter::new(false);
        let records = vec![
            ConsumptionRecord::new(at(12, 0), 100.0),
            ConsumptionRecord::new(at(12, 1), 100.25),
            ConsumptionRecord::new(at(12, 2), 100.25),
        ];

        let output = formatter.format_consumptions(&records);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("2024-02-12 00:00"));
        assert!(lines[2].contains("+0.250"));
        assert!(lines[4].contains("Total: 0.250"));
    }

    #[test]
    fn test_empty_listings() {
        let formatter = TextFormatter::new(false);
        assert_eq!(formatter.format_consumptions(&[]), "No readings");
        assert_eq!(formatter.format_contracts(&[]), "No contracts");
        assert_eq!(formatter.format_stats(&[]), "No statistics stored");
    }

    #[test]
    fn test_contracts_listing() {
        let formatter = TextFormatter::new(false);
        let contracts: Vec<Contract> = serde_json::from_value(json!([
            { "contractDetail": { "contractNumber": "W1234567" }, "assignationStatus": "ASSIGNED" },
            { "contractDetail": { "contractNumber": "W7654321" } },
        ]))
        .unwrap();

        let output = formatter.format_contracts(&contracts);
        assert!(output.contains("W1234567 (ASSIGNED)"));
        assert!(output.contains("W7654321"));
    }

    #[test]
    fn test_reading_with_and_without_value() {
        let formatter = TextFormatter::new(false);
        let state = ContractState {
            state_time: Some(at(12, 3)),
            value: Some(101.5),
            ..ContractState::default()
        };
        let reading = MeterReading::from_state("W1", &state);
        assert_eq!(
            formatter.format_reading(&reading),
            "Contador w1: 101.500 m³ at 2024-02-12 03:00"
        );

        let empty = MeterReading::from_state("W1", &ContractState::default());
        assert_eq!(formatter.format_reading(&empty), "Contador w1: unknown");
    }

    #[test]
    fn test_outcomes() {
        let formatter = TextFormatter::new(false);
        let updated = UpdateOutcome::Updated {
            at: at(12, 3),
            value: 1.0,
            backfilled_weeks: 2,
        };
        assert_eq!(
            formatter.format_outcome("W1", &updated),
            "W1: updated, 2 weeks backfilled"
        );
        assert!(
            formatter
                .format_outcome("W1", &UpdateOutcome::Skipped(SkipReason::TooEarly))
                .contains("skipped")
        );
        assert_eq!(
            formatter.format_outcome("W1", &UpdateOutcome::Errored("boom".to_string())),
            "W1: error: boom"
        );
    }

    #[test]
    fn test_colors_only_when_enabled() {
        let reading = MeterReading::from_state("W1", &ContractState::default());
        assert!(TextFormatter::new(true).format_reading(&reading).contains("\x1b["));
        assert!(!TextFormatter::new(false).format_reading(&reading).contains("\x1b["));
    }

    #[test]
    fn test_stats_rows() {
        let formatter = TextFormatter::new(false);
        let summaries = vec![StatisticSummary {
            statistic_id: "sensor.contador_w1".to_string(),
            unit_of_measurement: "m³".to_string(),
            points: 24,
            last_start: Some(at(12, 23)),
            last_sum: Some(12.5),
        }];

        let output = formatter.format_stats(&summaries);
        assert!(output.contains("sensor.contador_w1"));
        assert!(output.contains("24"));
        assert!(output.contains("12.500 m³"));
    }
}

mod json_formatter_tests {
    use super::super::json::{JsonFormatter, RefreshOutput};
    use aigues_store::{SkipReason, UpdateOutcome};
    use serde_json::Value;

    #[test]
    fn test_compact_and_pretty() {
        let value = serde_json::json!({ "a": 1 });
        assert_eq!(JsonFormatter::new(false).format(&value).unwrap(), r#"{"a":1}"#);
        assert!(JsonFormatter::new(true).format(&value).unwrap().contains('\n'));
    }

    #[test]
    fn test_refresh_output_skipped() {
        let output = RefreshOutput::new("W1", &UpdateOutcome::Skipped(SkipReason::NoData), None);
        let json: Value =
            serde_json::from_str(&JsonFormatter::new(false).format(&output).unwrap()).unwrap();

        assert_eq!(json["contract"], "W1");
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["detail"], "no readings available");
        assert!(json.get("reading").is_none());
        assert!(json.get("backfilledWeeks").is_none());
    }
}
