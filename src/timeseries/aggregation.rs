use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::store::TimeSeriesStore;
use crate::{db::models::Reading, error::CoreResult};

/// min/max/avg/count over a range. `count == 0` means "no data", in which
/// case the statistics are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Summary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Single-pass accumulator. The sum is compensated (Neumaier) so long runs of
/// similar values don't drift.
#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    compensation: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;

        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    fn finish(self) -> Summary {
        if self.count == 0 {
            return Summary::default();
        }
        Summary {
            count: self.count,
            min: Some(self.min),
            max: Some(self.max),
            avg: Some((self.sum + self.compensation) / self.count as f64),
        }
    }
}

pub fn summarize_slice(readings: &[Reading]) -> Summary {
    let mut acc = Accumulator::default();
    for r in readings {
        acc.add(r.value);
    }
    acc.finish()
}

/// Computes summaries directly on top of `TimeSeriesStore` scans.
#[derive(Clone)]
pub struct AggregationEngine {
    store: TimeSeriesStore,
}

impl AggregationEngine {
    pub fn new(store: TimeSeriesStore) -> Self {
        Self { store }
    }

    /// Summary of `start <= recorded_at <= end`, computed under the series
    /// read lock so no concurrent append is partially visible.
    pub async fn summarize(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<Summary> {
        self.store.scan(sensor_id, start, end, summarize_slice).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        db::models::Status,
        error::CoreError,
        timeseries::store::StoreConfig,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    async fn engine_with(values: &[f64]) -> (TimeSeriesStore, AggregationEngine) {
        let store = TimeSeriesStore::new(StoreConfig::default());
        store.register_sensor(1).await;
        for (i, v) in values.iter().enumerate() {
            store
                .append(1, t0() + Duration::minutes(i as i64), *v, Status::Normal)
                .await
                .unwrap();
        }
        (store.clone(), AggregationEngine::new(store))
    }

    #[tokio::test]
    async fn summarize_matches_manual_computation_over_range() {
        let values = [21.5, 24.0, 19.25, 30.5, 22.0, 27.75, 18.0];
        let (store, engine) = engine_with(&values).await;
        let start = t0() + Duration::minutes(1);
        let end = t0() + Duration::minutes(5);

        let summary = engine.summarize(1, start, end).await.unwrap();
        let range = store.range(1, start, end, None).await.unwrap();

        let vals: Vec<f64> = range.iter().map(|r| r.value).collect();
        let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
        let max = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = vals.iter().sum::<f64>() / vals.len() as f64;

        assert_eq!(summary.count, vals.len());
        assert_eq!(summary.min, Some(min));
        assert_eq!(summary.max, Some(max));
        assert!((summary.avg.unwrap() - avg).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_range_is_zero_count_not_error() {
        let (_, engine) = engine_with(&[1.0, 2.0]).await;
        let start = t0() + Duration::days(1);
        let summary = engine.summarize(1, start, start + Duration::hours(1)).await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary, Summary::default());
    }

    #[tokio::test]
    async fn unknown_sensor_and_inverted_range_are_errors() {
        let (_, engine) = engine_with(&[1.0]).await;
        assert_eq!(
            engine.summarize(9, t0(), t0()).await.unwrap_err(),
            CoreError::UnknownSensor(9)
        );
        assert!(matches!(
            engine.summarize(1, t0() + Duration::hours(1), t0()).await.unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[test]
    fn compensated_sum_keeps_precision() {
        let readings: Vec<Reading> = std::iter::once(1e16)
            .chain(std::iter::repeat(1.0).take(1000))
            .chain(std::iter::once(-1e16))
            .enumerate()
            .map(|(i, value)| Reading {
                sensor_id: 1,
                sequence: i as i64,
                value,
                recorded_at: t0(),
                status: Status::Normal,
            })
            .collect();

        let summary = summarize_slice(&readings);
        assert_eq!(summary.count, 1002);
        assert!((summary.avg.unwrap() - 1000.0 / 1002.0).abs() < 1e-9);
    }

    #[test]
    fn negative_values_track_min_and_max() {
        let readings: Vec<Reading> = [-3.0, -1.0, -7.5]
            .into_iter()
            .enumerate()
            .map(|(i, value)| Reading {
                sensor_id: 1,
                sequence: i as i64,
                value,
                recorded_at: t0(),
                status: Status::Normal,
            })
            .collect();

        let s = summarize_slice(&readings);
        assert_eq!(s.min, Some(-7.5));
        assert_eq!(s.max, Some(-1.0));
    }
}
