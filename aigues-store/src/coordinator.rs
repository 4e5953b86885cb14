//! Per-contract polling coordinator.
//!
//! A coordinator owns one contract. Each cycle it decides whether a fetch is
//! due, pulls the trailing week of readings, publishes the latest one to the
//! registry, imports every reading into the statistics sink and, after a
//! long gap, walks back week by week to fill the hole.

use aigues_core::{ConsumptionRecord, Frequency, StatisticMetadata, StatisticPoint};
use aigues_fetch::{ApiError, ConsumptionSource};
use chrono::{Duration, Local, NaiveDateTime};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::error::StoreError;
use crate::registry::{ContractRegistry, MeterReading};
use crate::settings::DEFAULT_SCAN_INTERVAL_SECS;
use crate::statistics::StatisticsSink;

/// Minimum minutes between the last reading and a new fetch.
pub const MIN_REFRESH_MINUTES: i64 = 60;

/// Days covered by a regular fetch.
pub const FETCH_WINDOW_DAYS: i64 = 7;

/// Gap, in days, from which a backfill runs.
pub const BACKFILL_THRESHOLD_DAYS: i64 = 7;

/// Prefix of every contract's statistic id.
const STATISTIC_PREFIX: &str = "sensor.contador_";

// ============================================================================
// Outcomes
// ============================================================================

/// Why a cycle did not update the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The latest reading is too recent.
    TooEarly,
    /// The fetch returned no readings.
    NoData,
    /// Another cycle for the contract is running.
    InProgress,
}

/// Result of one polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// State updated from the latest reading.
    Updated {
        /// Timestamp of the reading.
        at: NaiveDateTime,
        /// Cumulative value.
        value: f64,
        /// Weeks fetched by the backfill, zero if none ran.
        backfilled_weeks: usize,
    },
    /// Nothing changed.
    Skipped(SkipReason),
    /// The fetch failed; the previous state is kept.
    Errored(String),
}

/// Failure that stops the coordinator until a new token arrives.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The session token expired or was revoked.
    #[error("Authentication failed for {contract}: {reason}")]
    AuthFailed {
        /// Contract whose cycle failed.
        contract: String,
        /// What was detected.
        reason: String,
    },
}

// ============================================================================
// Coordinator
// ============================================================================

/// Polling coordinator for one contract.
pub struct ContractCoordinator<C> {
    source: C,
    contract: String,
    id: String,
    statistic_id: String,
    registry: ContractRegistry,
    sink: Arc<dyn StatisticsSink>,
    scan_interval: std::time::Duration,
}

impl<C> std::fmt::Debug for ContractCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractCoordinator")
            .field("contract", &self.contract)
            .field("statistic_id", &self.statistic_id)
            .field("scan_interval", &self.scan_interval)
            .finish_non_exhaustive()
    }
}

impl<C: ConsumptionSource> ContractCoordinator<C> {
    /// Creates a coordinator for `contract`.
    pub fn new(
        source: C,
        contract: &str,
        registry: ContractRegistry,
        sink: Arc<dyn StatisticsSink>,
    ) -> Self {
        let id = contract.to_lowercase();
        Self {
            source,
            contract: contract.to_uppercase(),
            statistic_id: format!("{STATISTIC_PREFIX}{id}"),
            id,
            registry,
            sink,
            scan_interval: std::time::Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
        }
    }

    /// Sets the polling interval used by the scheduler.
    #[must_use]
    pub fn with_scan_interval(mut self, interval: std::time::Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Contract number, upper case.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Contract identifier, lower case.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Statistic series id.
    pub fn statistic_id(&self) -> &str {
        &self.statistic_id
    }

    /// Polling interval.
    pub fn scan_interval(&self) -> std::time::Duration {
        self.scan_interval
    }

    /// Shared registry.
    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Underlying consumption source.
    pub fn source(&self) -> &C {
        &self.source
    }

    /// Installs a new session token on the source.
    pub fn set_token(&mut self, token: String) {
        self.source.set_token(token);
        info!(contract = %self.contract, "Token updated");
    }

    /// Current meter view of the contract.
    pub async fn reading(&self) -> Option<MeterReading> {
        self.registry.reading(&self.contract).await
    }

    fn auth_failed(&self, reason: impl Into<String>) -> CoordinatorError {
        CoordinatorError::AuthFailed {
            contract: self.contract.clone(),
            reason: reason.into(),
        }
    }

    // ========================================================================
    // Update Cycle
    // ========================================================================

    /// Runs one cycle against the local clock.
    pub async fn update(&mut self) -> Result<UpdateOutcome, CoordinatorError> {
        self.update_at(Local::now().naive_local()).await
    }

    /// Runs one cycle as if the time were `now`.
    ///
    /// Only one cycle per contract runs at a time; an overlapping call is
    /// skipped.
    #[instrument(skip(self), fields(contract = %self.contract))]
    pub async fn update_at(&mut self, now: NaiveDateTime) -> Result<UpdateOutcome, CoordinatorError> {
        info!("Updating coordinator data");

        if self.registry.start_refresh(&self.contract).await.is_err() {
            debug!("Cycle already running");
            return Ok(UpdateOutcome::Skipped(SkipReason::InProgress));
        }
        let result = self.run_cycle(now).await;
        self.registry.end_refresh(&self.contract).await;
        result
    }

    async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<UpdateOutcome, CoordinatorError> {
        let last_week = now - Duration::days(FETCH_WINDOW_DAYS);
        let previous = self.registry.state_time(&self.contract).await;

        if let Some(previous) = previous {
            if now - previous <= Duration::minutes(MIN_REFRESH_MINUTES) {
                warn!(last = %previous, "Skipping request update data, too early");
                return Ok(UpdateOutcome::Skipped(SkipReason::TooEarly));
            }
        }

        // After a restart the registry is empty; the sink still knows how far
        // the series goes, which is enough to decide on a backfill.
        let gap_start = match previous {
            Some(previous) => Some(previous),
            None => self.seed_from_sink().await,
        };
        let gap_days = gap_start.map(|start| (now - start).num_days());

        if self.source.is_token_expired() {
            error!("Token has expired, cannot check consumptions");
            self.registry
                .set_error(&self.contract, ApiError::TokenExpired.to_string())
                .await;
            return Err(self.auth_failed(ApiError::TokenExpired.to_string()));
        }

        let records = match self
            .source
            .consumptions(last_week.date(), now.date(), &self.contract, Frequency::Hourly)
            .await
        {
            Ok(records) => records,
            Err(e) => return self.fetch_failed(e).await,
        };

        let Some(latest) = records.iter().max_by_key(|r| r.datetime).cloned() else {
            error!("No consumptions available");
            return Ok(UpdateOutcome::Skipped(SkipReason::NoData));
        };

        self.registry
            .set_reading(
                &self.contract,
                latest.datetime,
                latest.accumulated_consumption,
                records.clone(),
            )
            .await;

        if let Err(e) = self.import_statistics(&records).await {
            warn!(error = %e, "Statistics import failed, state kept");
        }

        let mut backfilled_weeks = 0;
        if let Some(days) = gap_days.filter(|d| *d >= BACKFILL_THRESHOLD_DAYS) {
            backfilled_weeks = self.import_old_consumptions_at(days, now).await?;
        }

        Ok(UpdateOutcome::Updated {
            at: latest.datetime,
            value: latest.accumulated_consumption,
            backfilled_weeks,
        })
    }

    async fn fetch_failed(&mut self, e: ApiError) -> Result<UpdateOutcome, CoordinatorError> {
        let message = e.to_string();
        self.registry.set_error(&self.contract, message.clone()).await;

        if e.is_auth_failure() {
            error!(error = %message, "Token rejected by the API");
            return Err(self.auth_failed(message));
        }

        error!(error = %message, "Fetching consumptions failed");
        Ok(UpdateOutcome::Errored(message))
    }

    async fn seed_from_sink(&self) -> Option<NaiveDateTime> {
        match self.get_last_measurement_stored().await {
            Ok(last) => {
                debug!(last = ?last, "Seeded from stored statistics");
                last
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored statistics");
                None
            }
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Imports readings into the contract's series.
    ///
    /// Readings are sorted by time, aligned to the hour and rounded; each
    /// point carries the cumulative value as both state and sum. Returns the
    /// number of points sent.
    pub async fn import_statistics(&self, records: &[ConsumptionRecord]) -> Result<usize, StoreError> {
        let mut sorted: Vec<&ConsumptionRecord> = records.iter().collect();
        sorted.sort_by_key(|r| r.datetime);

        let points: Vec<StatisticPoint> = sorted
            .iter()
            .map(|r| StatisticPoint::cumulative(r.datetime, r.accumulated_consumption))
            .collect();

        let metadata = StatisticMetadata::cubic_meters(&self.statistic_id);
        self.sink.import_statistics(&metadata, &points).await?;
        debug!(points = points.len(), "Statistics imported");
        Ok(points.len())
    }

    /// Backfills the last `days` days in weekly steps.
    pub async fn import_old_consumptions(&mut self, days: i64) -> Result<usize, CoordinatorError> {
        self.import_old_consumptions_at(days, Local::now().naive_local())
            .await
    }

    /// Walks from `now - days` to `now` one week at a time, importing each
    /// week's daily readings. Returns the number of weeks fetched.
    ///
    /// A failed week is logged and skipped unless it signals an
    /// authentication failure.
    #[instrument(skip(self), fields(contract = %self.contract))]
    pub async fn import_old_consumptions_at(
        &mut self,
        days: i64,
        now: NaiveDateTime,
    ) -> Result<usize, CoordinatorError> {
        if self.source.is_token_expired() {
            return Err(self.auth_failed(ApiError::TokenExpired.to_string()));
        }

        info!(days, "Importing old consumptions");
        let mut current = now - Duration::days(days);
        let mut weeks = 0;

        while current < now {
            match self
                .source
                .consumptions_week(current.date(), &self.contract)
                .await
            {
                Ok(records) if records.is_empty() => {
                    warn!(date = %current.date(), "No data available");
                }
                Ok(records) => {
                    if let Err(e) = self.import_statistics(&records).await {
                        warn!(date = %current.date(), error = %e, "Statistics import failed");
                    }
                }
                Err(e) if e.is_auth_failure() => return Err(self.auth_failed(e.to_string())),
                Err(e) => {
                    warn!(date = %current.date(), error = %e, "Weekly fetch failed");
                }
            }
            weeks += 1;
            current += Duration::weeks(1);
        }

        Ok(weeks)
    }

    /// Deletes the contract's stored series. Returns how many were removed.
    ///
    /// Only the exact series id matches; `w1` never clears `w12`.
    pub async fn clear_all_stored_data(&self) -> Result<usize, StoreError> {
        let to_clear: Vec<String> = self
            .sink
            .list_statistic_ids()
            .await?
            .into_iter()
            .map(|s| s.statistic_id)
            .filter(|id| *id == self.statistic_id)
            .collect();

        if to_clear.is_empty() {
            return Ok(0);
        }

        warn!(count = to_clear.len(), contract = %self.contract, "Deleting stored statistics");
        self.sink.clear_statistics(&to_clear).await?;
        Ok(to_clear.len())
    }

    /// Start of the latest stored point of the contract's series.
    pub async fn get_last_measurement_stored(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        let last = self
            .sink
            .list_statistic_ids()
            .await?
            .into_iter()
            .find(|s| s.statistic_id == self.statistic_id)
            .and_then(|s| s.last_start);
        Ok(last)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::MemoryStatistics;
    use aigues_core::StatisticSummary;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Timelike};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeSource {
        expired: bool,
        responses: VecDeque<Result<Vec<ConsumptionRecord>, ApiError>>,
        week_records: Vec<ConsumptionRecord>,
        range_calls: Vec<(NaiveDate, NaiveDate, Frequency)>,
        week_calls: Vec<NaiveDate>,
        tokens: Vec<String>,
    }

    impl FakeSource {
        fn returning(records: Vec<ConsumptionRecord>) -> Self {
            Self {
                responses: VecDeque::from([Ok(records)]),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ConsumptionSource for FakeSource {
        fn is_token_expired(&self) -> bool {
            self.expired
        }

        fn set_token(&mut self, token: String) {
            self.expired = false;
            self.tokens.push(token);
        }

        async fn consumptions(
            &mut self,
            date_from: NaiveDate,
            date_to: NaiveDate,
            _contract: &str,
            frequency: Frequency,
        ) -> Result<Vec<ConsumptionRecord>, ApiError> {
            self.range_calls.push((date_from, date_to, frequency));
            self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn consumptions_week(
            &mut self,
            date: NaiveDate,
            _contract: &str,
        ) -> Result<Vec<ConsumptionRecord>, ApiError> {
            self.week_calls.push(date);
            Ok(self.week_records.clone())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl StatisticsSink for FailingSink {
        async fn import_statistics(
            &self,
            _metadata: &StatisticMetadata,
            _points: &[StatisticPoint],
        ) -> Result<(), StoreError> {
            Err(StoreError::Statistics("sink offline".to_string()))
        }

        async fn list_statistic_ids(&self) -> Result<Vec<StatisticSummary>, StoreError> {
            Err(StoreError::Statistics("sink offline".to_string()))
        }

        async fn statistics(&self, _statistic_id: &str) -> Result<Vec<StatisticPoint>, StoreError> {
            Ok(Vec::new())
        }

        async fn clear_statistics(&self, _statistic_ids: &[String]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn record(day: u32, hour: u32, minute: u32, value: f64) -> ConsumptionRecord {
        ConsumptionRecord::new(at(day, hour, minute), value)
    }

    fn coordinator(
        source: FakeSource,
        sink: Arc<dyn StatisticsSink>,
    ) -> ContractCoordinator<FakeSource> {
        ContractCoordinator::new(source, "w1234567", ContractRegistry::new(), sink)
    }

    #[test]
    fn test_identity() {
        let coord = coordinator(FakeSource::default(), Arc::new(MemoryStatistics::new()));
        assert_eq!(coord.contract(), "W1234567");
        assert_eq!(coord.id(), "w1234567");
        assert_eq!(coord.statistic_id(), "sensor.contador_w1234567");
        assert_eq!(coord.scan_interval().as_secs(), 14_400);
    }

    #[tokio::test]
    async fn test_update_uses_latest_reading() {
        let source = FakeSource::returning(vec![
            record(10, 8, 0, 102.5),
            record(9, 8, 0, 101.0),
            record(10, 9, 0, 103.25),
            record(8, 8, 0, 100.0),
        ]);
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));

        let outcome = coord.update_at(at(10, 9, 30)).await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                at: at(10, 9, 0),
                value: 103.25,
                backfilled_weeks: 0,
            }
        );

        let state = coord.registry().get("W1234567").await.unwrap();
        assert_eq!(state.value, Some(103.25));
        assert_eq!(state.state_time, Some(at(10, 9, 0)));
        assert_eq!(state.consumptions.len(), 4);

        let calls = &coord.source().range_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, at(3, 0, 0).date());
        assert_eq!(calls[0].1, at(10, 0, 0).date());
        assert_eq!(calls[0].2, Frequency::Hourly);
    }

    #[tokio::test]
    async fn test_statistics_sorted_and_hour_aligned() {
        let sink = Arc::new(MemoryStatistics::new());
        let source = FakeSource::returning(vec![
            record(10, 7, 45, 3.000_000_000_01),
            record(9, 23, 59, 2.123_456_78),
            record(10, 1, 15, 2.5),
        ]);
        let mut coord = coordinator(source, sink.clone());
        coord.update_at(at(11, 0, 0)).await.unwrap();

        let points = sink.statistics("sensor.contador_w1234567").await.unwrap();
        let starts: Vec<NaiveDateTime> = points.iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![at(9, 23, 0), at(10, 1, 0), at(10, 7, 0)]);
        assert!(points.iter().all(|p| p.start.minute() == 0 && p.start.second() == 0));
        assert!(points.iter().all(|p| p.state == p.sum));
        assert_eq!(points[0].sum, 2.1235);
        assert_eq!(points[2].sum, 3.0);
    }

    #[tokio::test]
    async fn test_second_tick_within_an_hour_is_skipped() {
        let mut source = FakeSource::returning(vec![record(10, 9, 0, 1.0)]);
        source.responses.push_back(Ok(vec![record(10, 10, 0, 2.0)]));
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));

        coord.update_at(at(10, 9, 10)).await.unwrap();
        let outcome = coord.update_at(at(10, 10, 0)).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::TooEarly));
        assert_eq!(coord.source().range_calls.len(), 1);
        let state = coord.registry().get("W1234567").await.unwrap();
        assert_eq!(state.value, Some(1.0));

        let outcome = coord.update_at(at(10, 10, 1)).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Updated { value, .. } if value == 2.0));
        assert_eq!(coord.source().range_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_nine_day_gap_backfills_two_weeks() {
        let mut source = FakeSource::returning(vec![record(20, 6, 0, 50.0)]);
        source.week_records = vec![record(12, 0, 0, 40.0), record(13, 0, 0, 41.0)];
        let sink = Arc::new(MemoryStatistics::new());
        let mut coord = coordinator(source, sink.clone());

        let now = at(20, 12, 0);
        coord
            .registry()
            .set_reading("W1234567", now - Duration::days(9), 30.0, Vec::new())
            .await;

        let outcome = coord.update_at(now).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Updated { backfilled_weeks: 2, .. }));

        let weeks = &coord.source().week_calls;
        assert_eq!(weeks, &vec![at(11, 0, 0).date(), at(18, 0, 0).date()]);

        let points = sink.statistics("sensor.contador_w1234567").await.unwrap();
        assert_eq!(points.len(), 3);
    }

    #[tokio::test]
    async fn test_short_gap_does_not_backfill() {
        let source = FakeSource::returning(vec![record(20, 6, 0, 50.0)]);
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));

        let now = at(20, 12, 0);
        coord
            .registry()
            .set_reading("W1234567", now - Duration::days(6), 30.0, Vec::new())
            .await;

        coord.update_at(now).await.unwrap();
        assert!(coord.source().week_calls.is_empty());
    }

    #[tokio::test]
    async fn test_restart_seeds_backfill_from_sink() {
        let sink = Arc::new(MemoryStatistics::new());
        let meta = StatisticMetadata::cubic_meters("sensor.contador_w1234567");
        sink.import_statistics(&meta, &[StatisticPoint::cumulative(at(10, 12, 0), 10.0)])
            .await
            .unwrap();

        let source = FakeSource::returning(vec![record(20, 6, 0, 50.0)]);
        let mut coord = coordinator(source, sink);

        let outcome = coord.update_at(at(20, 12, 0)).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Updated { backfilled_weeks: 2, .. }));
        assert_eq!(coord.source().week_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_token_fails_without_fetching() {
        let source = FakeSource {
            expired: true,
            ..FakeSource::returning(vec![record(10, 9, 0, 1.0)])
        };
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));

        let result = coord.update_at(at(10, 10, 0)).await;
        assert!(matches!(result, Err(CoordinatorError::AuthFailed { .. })));
        assert!(coord.source().range_calls.is_empty());
        assert!(!coord.registry().is_refreshing("W1234567").await);
    }

    #[tokio::test]
    async fn test_revoked_token_escalates() {
        let source = FakeSource {
            responses: VecDeque::from([Err(ApiError::Denied(
                r#"{"statusCode":401,"message":"JWT Token Revoked"}"#.to_string(),
            ))]),
            ..FakeSource::default()
        };
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));

        let result = coord.update_at(at(10, 10, 0)).await;
        match result {
            Err(CoordinatorError::AuthFailed { contract, reason }) => {
                assert_eq!(contract, "W1234567");
                assert!(reason.contains("JWT Token Revoked"));
            }
            other => panic!("expected auth failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_previous_state() {
        let source = FakeSource {
            responses: VecDeque::from([Err(ApiError::ServiceUnavailable)]),
            ..FakeSource::default()
        };
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));
        coord
            .registry()
            .set_reading("W1234567", at(1, 0, 0), 9.0, Vec::new())
            .await;

        let outcome = coord.update_at(at(10, 10, 0)).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Errored(_)));

        let state = coord.registry().get("W1234567").await.unwrap();
        assert_eq!(state.value, Some(9.0));
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_empty_fetch_is_skipped() {
        let source = FakeSource::returning(Vec::new());
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));

        let outcome = coord.update_at(at(10, 10, 0)).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::NoData));
        assert!(coord.registry().get("W1234567").await.is_none());
    }

    #[tokio::test]
    async fn test_import_failure_does_not_block_state() {
        let source = FakeSource::returning(vec![record(10, 9, 0, 7.5)]);
        let mut coord = coordinator(source, Arc::new(FailingSink));

        let outcome = coord.update_at(at(10, 12, 0)).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Updated { value, .. } if value == 7.5));
        assert!(coord.import_statistics(&[record(10, 9, 0, 7.5)]).await.is_err());
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let mut coord = coordinator(FakeSource::default(), Arc::new(MemoryStatistics::new()));
        coord.registry().start_refresh("W1234567").await.unwrap();

        let outcome = coord.update_at(at(10, 10, 0)).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::InProgress));
        assert!(coord.source().range_calls.is_empty());
    }

    #[tokio::test]
    async fn test_clear_and_last_measurement() {
        let sink = Arc::new(MemoryStatistics::new());
        let own = StatisticMetadata::cubic_meters("sensor.contador_w1234567");
        let other = StatisticMetadata::cubic_meters("sensor.contador_w7654321");
        sink.import_statistics(&own, &[StatisticPoint::cumulative(at(5, 3, 0), 1.0)])
            .await
            .unwrap();
        sink.import_statistics(&other, &[StatisticPoint::cumulative(at(5, 3, 0), 1.0)])
            .await
            .unwrap();

        let coord = coordinator(FakeSource::default(), sink.clone());
        assert_eq!(coord.get_last_measurement_stored().await.unwrap(), Some(at(5, 3, 0)));

        assert_eq!(coord.clear_all_stored_data().await.unwrap(), 1);
        assert_eq!(coord.get_last_measurement_stored().await.unwrap(), None);
        assert_eq!(sink.list_statistic_ids().await.unwrap().len(), 1);
        assert_eq!(coord.clear_all_stored_data().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_leaves_series_sharing_a_prefix() {
        let sink = Arc::new(MemoryStatistics::new());
        for id in ["sensor.contador_w1", "sensor.contador_w12"] {
            sink.import_statistics(
                &StatisticMetadata::cubic_meters(id),
                &[StatisticPoint::cumulative(at(5, 3, 0), 1.0)],
            )
            .await
            .unwrap();
        }

        let coord = ContractCoordinator::new(
            FakeSource::default(),
            "W1",
            ContractRegistry::new(),
            sink.clone(),
        );
        assert_eq!(coord.clear_all_stored_data().await.unwrap(), 1);

        let left: Vec<String> = sink
            .list_statistic_ids()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.statistic_id)
            .collect();
        assert_eq!(left, vec!["sensor.contador_w12"]);
    }

    #[tokio::test]
    async fn test_set_token_reaches_source() {
        let source = FakeSource {
            expired: true,
            ..FakeSource::default()
        };
        let mut coord = coordinator(source, Arc::new(MemoryStatistics::new()));
        coord.set_token("fresh".to_string());
        assert!(!coord.source().is_token_expired());
        assert_eq!(coord.source().tokens, vec!["fresh"]);
    }
}
