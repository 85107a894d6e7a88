use std::{collections::HashMap, ops::Range, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    db::models::{Reading, Status},
    error::{CoreError, CoreResult},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreConfig {
    /// Reject a reading whose `(sensor_id, recorded_at)` is already stored.
    pub dedup: bool,
}

/// One sensor's readings, kept sorted by `(recorded_at, sequence)`.
#[derive(Debug, Default)]
struct Series {
    readings: Vec<Reading>,
    next_sequence: i64,
}

impl Series {
    /// Insert keeping `(recorded_at, sequence)` order. In-order appends hit
    /// the `push` fast path.
    fn insert_ordered(&mut self, reading: Reading) {
        let key = (reading.recorded_at, reading.sequence);
        match self.readings.last() {
            Some(last) if (last.recorded_at, last.sequence) > key => {
                let idx = self
                    .readings
                    .partition_point(|r| (r.recorded_at, r.sequence) <= key);
                self.readings.insert(idx, reading);
            }
            _ => self.readings.push(reading),
        }
    }

    fn contains_timestamp(&self, ts: DateTime<Utc>) -> bool {
        let idx = self.readings.partition_point(|r| r.recorded_at < ts);
        self.readings.get(idx).is_some_and(|r| r.recorded_at == ts)
    }

    /// Index range of readings with `start <= recorded_at <= end`.
    fn bounds(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Range<usize> {
        let lo = self.readings.partition_point(|r| r.recorded_at < start);
        let hi = self.readings.partition_point(|r| r.recorded_at <= end);
        lo..hi.max(lo)
    }
}

/// Append-only, per-sensor ordered reading storage.
///
/// Each sensor's series sits behind its own `RwLock`, so writes to different
/// sensors never contend and readers always see whole appends. The outer map
/// lock is only held long enough to find (or create) a series.
#[derive(Clone, Default)]
pub struct TimeSeriesStore {
    config: StoreConfig,
    series: Arc<RwLock<HashMap<i64, Arc<RwLock<Series>>>>>,
}

impl TimeSeriesStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            series: Arc::default(),
        }
    }

    /// Create an empty series for `sensor_id`. No-op if one exists.
    pub async fn register_sensor(&self, sensor_id: i64) {
        self.series.write().await.entry(sensor_id).or_default();
    }

    async fn series(&self, sensor_id: i64) -> CoreResult<Arc<RwLock<Series>>> {
        self.series
            .read()
            .await
            .get(&sensor_id)
            .cloned()
            .ok_or(CoreError::UnknownSensor(sensor_id))
    }

    /// Append a classified reading and return it with its assigned sequence.
    pub async fn append(
        &self,
        sensor_id: i64,
        recorded_at: DateTime<Utc>,
        value: f64,
        status: Status,
    ) -> CoreResult<Reading> {
        let series = self.series(sensor_id).await?;
        let mut series = series.write().await;

        if self.config.dedup && series.contains_timestamp(recorded_at) {
            return Err(CoreError::Duplicate {
                sensor_id,
                timestamp: recorded_at,
            });
        }

        let reading = Reading {
            sensor_id,
            sequence: series.next_sequence,
            value,
            recorded_at,
            status,
        };
        series.next_sequence += 1;
        series.insert_ordered(reading.clone());

        debug!(sensor_id, sequence = reading.sequence, "Reading appended");
        Ok(reading)
    }

    /// Re-insert a previously stored reading, keeping its sequence number.
    /// Used when replaying the journal.
    pub async fn restore(&self, reading: Reading) -> CoreResult<()> {
        let series = self.series(reading.sensor_id).await?;
        let mut series = series.write().await;
        series.next_sequence = series.next_sequence.max(reading.sequence + 1);
        series.insert_ordered(reading);
        Ok(())
    }

    /// Readings with `start <= recorded_at <= end` in `(recorded_at, sequence)`
    /// order. With a `limit`, only the most recent `limit` of them are kept.
    pub async fn range(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Reading>> {
        self.scan(sensor_id, start, end, |slice| {
            let skip = limit.map_or(0, |n| slice.len().saturating_sub(n));
            slice[skip..].to_vec()
        })
        .await
    }

    /// One reading per epoch-aligned bucket of `bucket_width`: the last
    /// reading that falls into the bucket.
    pub async fn downsample(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket_width: Duration,
    ) -> CoreResult<Vec<Reading>> {
        let width_ms = bucket_width.num_milliseconds();
        if width_ms <= 0 {
            return Err(CoreError::validation("bucket width must be positive"));
        }

        self.scan(sensor_id, start, end, |slice| {
            let mut out: Vec<Reading> = Vec::new();
            let mut current: Option<i64> = None;

            for r in slice {
                let bucket = r.recorded_at.timestamp_millis().div_euclid(width_ms);
                if current == Some(bucket) {
                    if let Some(last) = out.last_mut() {
                        *last = r.clone();
                    }
                } else {
                    current = Some(bucket);
                    out.push(r.clone());
                }
            }
            out
        })
        .await
    }

    /// Most recent reading of a sensor, if any.
    pub async fn latest(&self, sensor_id: i64) -> CoreResult<Option<Reading>> {
        let series = self.series(sensor_id).await?;
        let series = series.read().await;
        Ok(series.readings.last().cloned())
    }

    /// Run `f` over the in-range slice while holding the series read lock,
    /// so `f` sees one consistent snapshot.
    pub async fn scan<T>(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        f: impl FnOnce(&[Reading]) -> T,
    ) -> CoreResult<T> {
        if start > end {
            return Err(CoreError::validation(format!(
                "range start {start} is after end {end}"
            )));
        }

        let series = self.series(sensor_id).await?;
        let series = series.read().await;
        let bounds = series.bounds(start, end);
        Ok(f(&series.readings[bounds]))
    }
}
