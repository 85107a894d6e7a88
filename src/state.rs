use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    config::Config,
    control::ControlService,
    db::{
        journal::{Journal, JournalEntry, Snapshot},
        models::PredictionResult,
    },
    error::CoreResult,
    prediction_cache::{NewPrediction, PredictionCache},
    sensors::{classification::ThresholdTable, SensorService},
    timeseries::StoreConfig,
};

/// Composition root handed to every HTTP handler. Cheap to clone; all clones
/// share the same stores.
#[derive(Clone)]
pub struct AppState {
    pub sensors: SensorService,
    pub control: ControlService,
    pub predictions: PredictionCache,
    journal: Option<Journal>,
}

impl AppState {
    pub fn new(thresholds: ThresholdTable, store_config: StoreConfig, journal: Option<Journal>) -> Self {
        let unconfigured = thresholds.unconfigured();
        if !unconfigured.is_empty() {
            let types: Vec<&str> = unconfigured.iter().map(|t| t.as_str()).collect();
            warn!(types = ?types, "Sensor types without thresholds will always classify as normal");
        }

        Self {
            sensors: SensorService::new(thresholds, store_config, journal.clone()),
            control: ControlService::new(journal.clone()),
            predictions: PredictionCache::new(),
            journal,
        }
    }

    /// In-memory state with default thresholds and no journal.
    pub fn in_memory() -> Self {
        Self::new(ThresholdTable::default(), StoreConfig::default(), None)
    }

    /// Build state from configuration: thresholds, dedup policy, journal
    /// replay, then configuration seeds.
    pub async fn from_config(
        config: &Config,
        journal: Option<Journal>,
        snapshot: Option<Snapshot>,
    ) -> Result<Self> {
        let thresholds = match &config.thresholds_file {
            Some(path) => ThresholdTable::from_json_file(path)?,
            None => ThresholdTable::default(),
        };
        let state = Self::new(
            thresholds,
            StoreConfig { dedup: config.ingest_dedup },
            journal,
        );

        if let Some(snapshot) = snapshot {
            state.restore(snapshot).await.context("failed to replay journal")?;
        }

        for seed in &config.sensors {
            state.sensors.seed(seed).await.context("failed to seed sensor")?;
        }
        for seed in &config.actuators {
            state.control.seed(seed).await.context("failed to seed actuator")?;
        }

        Ok(state)
    }

    async fn restore(&self, snapshot: Snapshot) -> CoreResult<()> {
        info!(
            sensors = snapshot.sensors.len(),
            readings = snapshot.readings.len(),
            actuators = snapshot.actuators.len(),
            predictions = snapshot.predictions.len(),
            "Replaying journal"
        );
        self.sensors.restore(snapshot.sensors, snapshot.readings).await?;
        self.control
            .restore(snapshot.actuators, snapshot.actuator_events)
            .await?;
        for prediction in snapshot.predictions {
            self.predictions.insert(prediction).await;
        }
        Ok(())
    }

    /// Store a prediction from the prediction engine and journal it.
    pub async fn store_prediction(&self, new: NewPrediction) -> CoreResult<PredictionResult> {
        let result = self.predictions.store(new).await?;
        info!(
            sensor_id = result.sensor_id,
            prediction_type = %result.prediction_type,
            "Prediction stored"
        );
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::PredictionStored(result.clone())).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        config::{ActuatorSeed, SensorSeed},
        db::models::{Reading, Sensor, SensorType, Status},
    };

    fn config() -> Config {
        Config {
            server_host: "127.0.0.1".to_owned(),
            server_port: 0,
            database_url: None,
            ingest_dedup: true,
            thresholds_file: None,
            sensors: vec![SensorSeed { id: 1, sensor_type: SensorType::Temperature, location: "GH1".to_owned() }],
            actuators: vec![ActuatorSeed { id: 1, actuator_type: "pump".to_owned(), location: "GH1".to_owned() }],
            journal_buffer: 16,
        }
    }

    #[tokio::test]
    async fn from_config_seeds_sensors_and_actuators() {
        let state = AppState::from_config(&config(), None, None).await.unwrap();
        assert_eq!(state.sensors.list().await.len(), 1);
        assert_eq!(state.control.list().await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_wins_over_seed_with_same_id() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let snapshot = Snapshot {
            sensors: vec![Sensor {
                id: 1,
                name: "Restored".to_owned(),
                sensor_type: SensorType::Temperature,
                unit: "°C".to_owned(),
                location: "GH1".to_owned(),
                description: None,
                created_at: t,
            }],
            readings: vec![Reading {
                sensor_id: 1,
                sequence: 0,
                value: 21.0,
                recorded_at: t,
                status: Status::Normal,
            }],
            ..Snapshot::default()
        };

        let state = AppState::from_config(&config(), None, Some(snapshot)).await.unwrap();
        assert_eq!(state.sensors.get(1).await.unwrap().name, "Restored");
        assert_eq!(state.sensors.latest(1).await.unwrap().unwrap().value, 21.0);
    }
}
