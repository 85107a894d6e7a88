use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::{
    classification::ThresholdTable,
    ingestion::{BridgeReading, IngestResult, IngestionGateway, RawReading},
    registry::{NewSensor, SensorRegistry},
};
use crate::{
    config::SensorSeed,
    db::{
        journal::{Journal, JournalEntry},
        models::{Reading, Sensor, SensorType},
    },
    error::CoreResult,
    timeseries::{AggregationEngine, Interval, StoreConfig, Summary, TimeSeriesStore},
};

/// Summary of one sensor over a window, as served by the history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorSummary {
    pub sensor_id: i64,
    pub sensor_type: SensorType,
    pub unit: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Sensor-side operations: registration, ingestion, and queries. Every
/// accepted mutation is forwarded to the journal when one is configured.
#[derive(Clone)]
pub struct SensorService {
    registry: SensorRegistry,
    store: TimeSeriesStore,
    gateway: IngestionGateway<SensorRegistry>,
    aggregation: AggregationEngine,
    thresholds: Arc<ThresholdTable>,
    journal: Option<Journal>,
}

impl SensorService {
    pub fn new(thresholds: ThresholdTable, store_config: StoreConfig, journal: Option<Journal>) -> Self {
        let thresholds = Arc::new(thresholds);
        let registry = SensorRegistry::new();
        let store = TimeSeriesStore::new(store_config);
        Self {
            gateway: IngestionGateway::new(registry.clone(), thresholds.clone(), store.clone()),
            aggregation: AggregationEngine::new(store.clone()),
            registry,
            store,
            thresholds,
            journal,
        }
    }

    async fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record(entry).await;
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Create the sensor's series and queue its journal entry. Runs before
    /// the sensor is visible to ingestion, so no reading can reach the store
    /// or the journal ahead of its sensor.
    async fn publish(&self, sensor: Sensor) {
        self.store.register_sensor(sensor.id).await;
        self.record(JournalEntry::SensorRegistered(sensor)).await;
    }

    pub async fn register(&self, new: NewSensor) -> CoreResult<Sensor> {
        let sensor = self
            .registry
            .register(new, |sensor| self.publish(sensor))
            .await?;
        info!(sensor_id = sensor.id, sensor_type = %sensor.sensor_type, "Sensor registered");

        if self.thresholds.get(sensor.sensor_type).is_none() {
            warn!(
                sensor_id = sensor.id,
                sensor_type = %sensor.sensor_type,
                "No thresholds configured for this sensor type; readings will classify as normal"
            );
        }
        Ok(sensor)
    }

    /// Register a sensor declared in configuration, unless it already exists
    /// (e.g. restored from the journal).
    pub async fn seed(&self, seed: &SensorSeed) -> CoreResult<()> {
        if self.registry.get(seed.id).await.is_ok() {
            return Ok(());
        }
        let sensor = Sensor {
            id: seed.id,
            name: format!("{} {}", seed.sensor_type, seed.id),
            sensor_type: seed.sensor_type,
            unit: seed.sensor_type.default_unit().to_owned(),
            location: seed.location.clone(),
            description: None,
            created_at: Utc::now(),
        };
        self.registry
            .insert(sensor, |sensor| self.publish(sensor))
            .await?;
        info!(sensor_id = seed.id, "Sensor seeded from configuration");
        Ok(())
    }

    /// Replay journaled sensors and readings. Readings must be ordered by
    /// sensor, then `(recorded_at, sequence)`.
    pub async fn restore(&self, sensors: Vec<Sensor>, readings: Vec<Reading>) -> CoreResult<()> {
        let store = &self.store;
        for sensor in sensors {
            self.registry
                .insert(sensor, |sensor| async move { store.register_sensor(sensor.id).await })
                .await?;
        }
        for reading in readings {
            self.store.restore(reading).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: i64) -> CoreResult<Sensor> {
        self.registry.get(id).await
    }

    pub async fn list(&self) -> Vec<Sensor> {
        self.registry.list().await
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    pub async fn ingest(&self, batch: Vec<RawReading>) -> IngestResult {
        let result = self.gateway.ingest(batch).await;
        self.record_accepted(&result).await;
        result
    }

    pub async fn ingest_bridge(&self, batch: Vec<BridgeReading>) -> IngestResult {
        let result = self.gateway.ingest_bridge(batch).await;
        self.record_accepted(&result).await;
        result
    }

    async fn record_accepted(&self, result: &IngestResult) {
        if !result.readings.is_empty() {
            self.record(JournalEntry::ReadingsAppended(result.readings.clone()))
                .await;
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn latest(&self, sensor_id: i64) -> CoreResult<Option<Reading>> {
        self.store.latest(sensor_id).await
    }

    /// The `limit` most recent readings of a sensor, oldest first.
    pub async fn recent(&self, sensor_id: i64, limit: usize) -> CoreResult<Vec<Reading>> {
        self.store
            .range(sensor_id, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC, Some(limit))
            .await
    }

    /// Readings in `[start, end]`, raw or downsampled to `interval`. The
    /// `limit` keeps the most recent points of the result.
    pub async fn history(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Reading>> {
        match interval.bucket_width() {
            None => self.store.range(sensor_id, start, end, limit).await,
            Some(width) => {
                let mut points = self.store.downsample(sensor_id, start, end, width).await?;
                if let Some(n) = limit {
                    let skip = points.len().saturating_sub(n);
                    points.drain(..skip);
                }
                Ok(points)
            }
        }
    }

    /// [`history`](Self::history) for several sensors at once, keyed by
    /// sensor id. Fails on the first unknown sensor.
    pub async fn history_many(
        &self,
        sensor_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> CoreResult<BTreeMap<i64, Vec<Reading>>> {
        let mut out = BTreeMap::new();
        for &id in sensor_ids {
            if out.contains_key(&id) {
                continue;
            }
            let points = self.history(id, start, end, interval, None).await?;
            out.insert(id, points);
        }
        Ok(out)
    }

    pub async fn summarize(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<SensorSummary> {
        let sensor = self.registry.get(sensor_id).await?;
        let summary = self.aggregation.summarize(sensor_id, start, end).await?;
        if summary.is_empty() {
            debug!(sensor_id, %start, %end, "No readings in summary window");
        }
        Ok(SensorSummary {
            sensor_id,
            sensor_type: sensor.sensor_type,
            unit: sensor.unit,
            start,
            end,
            summary,
        })
    }

    /// One summary per requested sensor, in request order. Fails on the first
    /// unknown sensor.
    pub async fn summarize_many(
        &self,
        sensor_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<Vec<SensorSummary>> {
        let mut out = Vec::with_capacity(sensor_ids.len());
        for &id in sensor_ids {
            out.push(self.summarize(id, start, end).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::CoreError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    async fn service_with_temperature_sensor() -> (SensorService, i64) {
        let service = SensorService::new(ThresholdTable::default(), StoreConfig::default(), None);
        let sensor = service
            .register(NewSensor {
                name: "Greenhouse air".to_owned(),
                sensor_type: SensorType::Temperature,
                unit: None,
                location: "Greenhouse 1".to_owned(),
                description: None,
            })
            .await
            .unwrap();
        (service, sensor.id)
    }

    fn reading(sensor_id: i64, value: f64, minutes: i64) -> RawReading {
        RawReading {
            sensor_id,
            sensor_type: None,
            value,
            timestamp: Some(t0() + Duration::minutes(minutes)),
        }
    }

    #[tokio::test]
    async fn registered_sensor_accepts_readings() {
        let (service, id) = service_with_temperature_sensor().await;
        let result = service.ingest(vec![reading(id, 24.5, 0)]).await;
        assert_eq!(result.accepted, 1);
        assert_eq!(service.latest(id).await.unwrap().unwrap().value, 24.5);
    }

    #[tokio::test]
    async fn recent_returns_last_n_oldest_first() {
        let (service, id) = service_with_temperature_sensor().await;
        let batch = (0..20).map(|m| reading(id, m as f64, m)).collect();
        service.ingest(batch).await;

        let recent = service.recent(id, 3).await.unwrap();
        let values: Vec<f64> = recent.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![17.0, 18.0, 19.0]);
    }

    #[tokio::test]
    async fn hourly_history_downsamples() {
        let (service, id) = service_with_temperature_sensor().await;
        let batch = (0..180).map(|m| reading(id, m as f64, m)).collect();
        service.ingest(batch).await;

        let end = t0() + Duration::minutes(179);
        let hourly = service.history(id, t0(), end, Interval::Hourly, None).await.unwrap();
        assert_eq!(hourly.iter().map(|r| r.value).collect::<Vec<_>>(), vec![59.0, 119.0, 179.0]);

        let limited = service.history(id, t0(), end, Interval::Hourly, Some(2)).await.unwrap();
        assert_eq!(limited.iter().map(|r| r.value).collect::<Vec<_>>(), vec![119.0, 179.0]);

        let raw = service.history(id, t0(), end, Interval::Raw, Some(5)).await.unwrap();
        assert_eq!(raw.len(), 5);
    }

    #[tokio::test]
    async fn summarize_many_carries_type_and_unit() {
        let (service, id) = service_with_temperature_sensor().await;
        service
            .ingest(vec![reading(id, 20.0, 0), reading(id, 30.0, 1)])
            .await;

        let summaries = service
            .summarize_many(&[id], t0(), t0() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].sensor_type, SensorType::Temperature);
        assert_eq!(summaries[0].unit, "°C");
        assert_eq!(summaries[0].summary.count, 2);
        assert_eq!(summaries[0].summary.avg, Some(25.0));

        let err = service
            .summarize_many(&[id, 77], t0(), t0() + Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::UnknownSensor(77));
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let service = SensorService::new(ThresholdTable::default(), StoreConfig::default(), None);
        let seed = SensorSeed { id: 5, sensor_type: SensorType::Ph, location: "Tank".to_owned() };
        service.seed(&seed).await.unwrap();
        service.seed(&seed).await.unwrap();

        let sensors = service.list().await;
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].unit, "pH");
        assert!(service.latest(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_replays_sensors_and_readings() {
        let service = SensorService::new(ThresholdTable::default(), StoreConfig::default(), None);
        let sensor = Sensor {
            id: 3,
            name: "Tank pH".to_owned(),
            sensor_type: SensorType::Ph,
            unit: "pH".to_owned(),
            location: "Aquaponics".to_owned(),
            description: None,
            created_at: t0(),
        };
        let stored = Reading {
            sensor_id: 3,
            sequence: 9,
            value: 6.8,
            recorded_at: t0(),
            status: crate::db::models::Status::Normal,
        };
        service.restore(vec![sensor], vec![stored.clone()]).await.unwrap();

        assert_eq!(service.latest(3).await.unwrap(), Some(stored));
        let next = service.ingest(vec![reading(3, 6.9, 1)]).await;
        assert_eq!(next.readings[0].sequence, 10);
    }

    #[tokio::test]
    async fn history_many_keys_points_by_sensor() {
        let (service, air) = service_with_temperature_sensor().await;
        let tank = service
            .register(NewSensor {
                name: "Tank pH".to_owned(),
                sensor_type: SensorType::Ph,
                unit: None,
                location: "Aquaponics".to_owned(),
                description: None,
            })
            .await
            .unwrap()
            .id;
        let batch = (0..120)
            .map(|m| reading(air, m as f64, m))
            .chain([reading(tank, 6.5, 0)])
            .collect();
        service.ingest(batch).await;

        let end = t0() + Duration::minutes(119);
        let raw = service
            .history_many(&[air, tank, air], t0(), end, Interval::Raw)
            .await
            .unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[&air].len(), 120);
        assert_eq!(raw[&tank].len(), 1);

        let hourly = service
            .history_many(&[air], t0(), end, Interval::Hourly)
            .await
            .unwrap();
        let values: Vec<f64> = hourly[&air].iter().map(|r| r.value).collect();
        assert_eq!(values, vec![59.0, 119.0]);

        let err = service
            .history_many(&[air, 42], t0(), end, Interval::Raw)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::UnknownSensor(42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readings_are_never_journaled_ahead_of_their_sensor() {
        let (journal, mut rx) = Journal::channel(16_384);
        let service = SensorService::new(ThresholdTable::default(), StoreConfig::default(), Some(journal));

        let ingester = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut accepted = 0;
                for m in 0..2000 {
                    accepted += service.ingest(vec![reading(1, 21.0, m)]).await.accepted;
                    tokio::task::yield_now().await;
                }
                accepted
            })
        };
        service
            .register(NewSensor {
                name: "Greenhouse air".to_owned(),
                sensor_type: SensorType::Temperature,
                unit: None,
                location: "Greenhouse 1".to_owned(),
                description: None,
            })
            .await
            .unwrap();
        let accepted = ingester.await.unwrap();
        assert_eq!(service.recent(1, usize::MAX).await.unwrap().len(), accepted);
        drop(service);

        let mut registered = false;
        let mut journaled = 0;
        while let Some(entry) = rx.recv().await {
            match entry {
                JournalEntry::SensorRegistered(sensor) => {
                    assert_eq!(sensor.id, 1);
                    registered = true;
                }
                JournalEntry::ReadingsAppended(readings) => {
                    assert!(registered, "readings journaled before their sensor");
                    journaled += readings.len();
                }
                other => panic!("unexpected journal entry: {other:?}"),
            }
        }
        assert!(registered);
        assert_eq!(journaled, accepted);
    }
}
