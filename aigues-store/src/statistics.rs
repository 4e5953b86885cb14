//! Statistics sinks.
//!
//! A sink keeps hour-aligned series keyed by statistic id. Importing a point
//! for an hour that already exists overwrites it, so re-importing an
//! overlapping window is harmless.

use aigues_core::{StatisticMetadata, StatisticPoint, StatisticSummary};
use async_trait::async_trait;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::persistence::{default_data_dir, load_json, save_json};

// ============================================================================
// Sink Trait
// ============================================================================

/// Destination for imported statistics.
#[async_trait]
pub trait StatisticsSink: Send + Sync {
    /// Imports points into the series described by `metadata`.
    ///
    /// Every point must start on the hour.
    async fn import_statistics(
        &self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), StoreError>;

    /// Lists stored series with a summary of each.
    async fn list_statistic_ids(&self) -> Result<Vec<StatisticSummary>, StoreError>;

    /// Returns the points of a series in ascending order.
    async fn statistics(&self, statistic_id: &str) -> Result<Vec<StatisticPoint>, StoreError>;

    /// Deletes the given series. Unknown ids are ignored.
    async fn clear_statistics(&self, statistic_ids: &[String]) -> Result<(), StoreError>;
}

// ============================================================================
// Series Table
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Series {
    metadata: StatisticMetadata,
    points: Vec<StatisticPoint>,
}

impl Series {
    fn summary(&self) -> StatisticSummary {
        let last = self.points.last();
        StatisticSummary {
            statistic_id: self.metadata.statistic_id.clone(),
            unit_of_measurement: self.metadata.unit_of_measurement.clone(),
            points: self.points.len(),
            last_start: last.map(|p| p.start),
            last_sum: last.map(|p| p.sum),
        }
    }
}

/// Series keyed by statistic id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SeriesTable {
    series: BTreeMap<String, Series>,
}

impl SeriesTable {
    fn import(
        &mut self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<usize, StoreError> {
        if let Some(bad) = points.iter().find(|p| !is_hour_aligned(p)) {
            return Err(StoreError::Statistics(format!(
                "point at {} is not hour-aligned",
                bad.start
            )));
        }

        let series = self
            .series
            .entry(metadata.statistic_id.clone())
            .or_insert_with(|| Series {
                metadata: metadata.clone(),
                points: Vec::new(),
            });
        series.metadata = metadata.clone();

        let mut merged: BTreeMap<_, _> = series.points.iter().map(|p| (p.start, *p)).collect();
        for point in points {
            merged.insert(point.start, *point);
        }
        series.points = merged.into_values().collect();

        Ok(series.points.len())
    }

    fn summaries(&self) -> Vec<StatisticSummary> {
        self.series.values().map(Series::summary).collect()
    }

    fn points(&self, statistic_id: &str) -> Vec<StatisticPoint> {
        self.series
            .get(statistic_id)
            .map(|s| s.points.clone())
            .unwrap_or_default()
    }

    fn clear(&mut self, statistic_ids: &[String]) -> usize {
        statistic_ids
            .iter()
            .filter(|id| self.series.remove(id.as_str()).is_some())
            .count()
    }
}

fn is_hour_aligned(point: &StatisticPoint) -> bool {
    point.start.minute() == 0 && point.start.second() == 0 && point.start.nanosecond() == 0
}

// ============================================================================
// In-Memory Sink
// ============================================================================

/// Sink that keeps series in memory.
#[derive(Debug, Default)]
pub struct MemoryStatistics {
    table: RwLock<SeriesTable>,
}

impl MemoryStatistics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatisticsSink for MemoryStatistics {
    async fn import_statistics(
        &self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), StoreError> {
        let total = self.table.write().await.import(metadata, points)?;
        debug!(statistic_id = %metadata.statistic_id, imported = points.len(), total, "Statistics imported");
        Ok(())
    }

    async fn list_statistic_ids(&self) -> Result<Vec<StatisticSummary>, StoreError> {
        Ok(self.table.read().await.summaries())
    }

    async fn statistics(&self, statistic_id: &str) -> Result<Vec<StatisticPoint>, StoreError> {
        Ok(self.table.read().await.points(statistic_id))
    }

    async fn clear_statistics(&self, statistic_ids: &[String]) -> Result<(), StoreError> {
        let removed = self.table.write().await.clear(statistic_ids);
        debug!(removed, "Statistics cleared");
        Ok(())
    }
}

// ============================================================================
// JSON File Sink
// ============================================================================

/// Sink persisted to a JSON file.
///
/// The file is read on first use and rewritten after every change.
#[derive(Debug)]
pub struct JsonStatistics {
    path: PathBuf,
    table: Mutex<Option<SeriesTable>>,
}

impl JsonStatistics {
    /// Creates a sink backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(None),
        }
    }

    /// Creates a sink at the default location.
    pub fn default_location() -> Self {
        Self::new(default_statistics_path())
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<SeriesTable, StoreError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(SeriesTable::default());
        }
        load_json(&self.path).await
    }

    /// Runs `f` on the loaded table. With `persist`, `f` works on a copy
    /// that replaces the cached table only once it is saved.
    async fn with_table<T>(
        &self,
        persist: bool,
        f: impl FnOnce(&mut SeriesTable) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut guard = self.table.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let Some(table) = guard.as_mut() else {
            return Err(StoreError::Statistics("statistics table unavailable".to_string()));
        };

        if !persist {
            return f(table);
        }

        let mut staged = table.clone();
        let result = f(&mut staged)?;
        save_json(&self.path, &staged).await?;
        *table = staged;
        Ok(result)
    }
}

#[async_trait]
impl StatisticsSink for JsonStatistics {
    #[instrument(skip(self, metadata, points), fields(statistic_id = %metadata.statistic_id))]
    async fn import_statistics(
        &self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), StoreError> {
        let total = self
            .with_table(true, |table| table.import(metadata, points))
            .await?;
        debug!(imported = points.len(), total, "Statistics imported");
        Ok(())
    }

    async fn list_statistic_ids(&self) -> Result<Vec<StatisticSummary>, StoreError> {
        self.with_table(false, |table| Ok(table.summaries())).await
    }

    async fn statistics(&self, statistic_id: &str) -> Result<Vec<StatisticPoint>, StoreError> {
        self.with_table(false, |table| Ok(table.points(statistic_id)))
            .await
    }

    async fn clear_statistics(&self, statistic_ids: &[String]) -> Result<(), StoreError> {
        let removed = self
            .with_table(true, |table| Ok(table.clear(statistic_ids)))
            .await?;
        info!(removed, path = %self.path.display(), "Statistics cleared");
        Ok(())
    }
}

/// Default statistics file path.
pub fn default_statistics_path() -> PathBuf {
    default_data_dir().join("statistics.json")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn point(day: u32, hour: u32, value: f64) -> StatisticPoint {
        StatisticPoint::cumulative(at(day, hour, 0), value)
    }

    #[tokio::test]
    async fn test_memory_import_merges_by_hour() {
        let sink = MemoryStatistics::new();
        let meta = StatisticMetadata::cubic_meters("sensor.contador_w1");

        sink.import_statistics(&meta, &[point(2, 0, 2.0), point(1, 0, 1.0)])
            .await
            .unwrap();
        sink.import_statistics(&meta, &[point(2, 0, 2.5), point(3, 0, 3.0)])
            .await
            .unwrap();

        let points = sink.statistics("sensor.contador_w1").await.unwrap();
        let sums: Vec<f64> = points.iter().map(|p| p.sum).collect();
        assert_eq!(sums, vec![1.0, 2.5, 3.0]);

        let ids = sink.list_statistic_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].points, 3);
        assert_eq!(ids[0].last_start, Some(at(3, 0, 0)));
        assert_eq!(ids[0].last_sum, Some(3.0));
    }

    #[tokio::test]
    async fn test_rejects_unaligned_points() {
        let sink = MemoryStatistics::new();
        let meta = StatisticMetadata::cubic_meters("sensor.contador_w1");
        let bad = StatisticPoint {
            start: at(1, 10, 30),
            state: 1.0,
            sum: 1.0,
        };

        let result = sink.import_statistics(&meta, &[point(1, 9, 0.5), bad]).await;
        assert!(matches!(result, Err(StoreError::Statistics(_))));
        assert!(sink.list_statistic_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_clear() {
        let sink = MemoryStatistics::new();
        let a = StatisticMetadata::cubic_meters("sensor.contador_a");
        let b = StatisticMetadata::cubic_meters("sensor.contador_b");
        sink.import_statistics(&a, &[point(1, 0, 1.0)]).await.unwrap();
        sink.import_statistics(&b, &[point(1, 0, 1.0)]).await.unwrap();

        sink.clear_statistics(&["sensor.contador_a".to_string(), "missing".to_string()])
            .await
            .unwrap();

        let ids = sink.list_statistic_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].statistic_id, "sensor.contador_b");
    }

    #[tokio::test]
    async fn test_json_sink_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats").join("statistics.json");
        let meta = StatisticMetadata::cubic_meters("sensor.contador_w1");

        {
            let sink = JsonStatistics::new(&path);
            assert!(sink.list_statistic_ids().await.unwrap().is_empty());
            sink.import_statistics(&meta, &[point(1, 0, 1.0), point(1, 1, 1.25)])
                .await
                .unwrap();
        }

        let reopened = JsonStatistics::new(&path);
        let points = reopened.statistics("sensor.contador_w1").await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].state, 1.25);

        reopened
            .clear_statistics(&["sensor.contador_w1".to_string()])
            .await
            .unwrap();
        let again = JsonStatistics::new(&path);
        assert!(again.list_statistic_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_sink_failed_save_leaves_cache_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.json");
        let meta = StatisticMetadata::cubic_meters("sensor.contador_w1");

        let sink = JsonStatistics::new(&path);
        sink.import_statistics(&meta, &[point(1, 0, 1.0)])
            .await
            .unwrap();

        // A non-empty directory at the target makes the final rename fail.
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        tokio::fs::write(path.join("keep"), "x").await.unwrap();

        let result = sink.import_statistics(&meta, &[point(1, 1, 2.0)]).await;
        assert!(result.is_err());
        let points = sink.statistics("sensor.contador_w1").await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].sum, 1.0);

        let result = sink
            .clear_statistics(&["sensor.contador_w1".to_string()])
            .await;
        assert!(result.is_err());
        let ids = sink.list_statistic_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].last_start, Some(at(1, 0, 0)));
    }
}
