use std::{collections::BTreeMap, future::Future, sync::Arc};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::{
    db::models::{Sensor, SensorType},
    error::{CoreError, CoreResult},
};

/// What the core needs to know about a sensor to accept its readings.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    pub sensor_type: SensorType,
    pub unit: String,
}

/// Read side of the sensor registry consumed by ingestion.
pub trait SensorLookup: Send + Sync {
    fn lookup_sensor(&self, id: i64) -> impl Future<Output = CoreResult<SensorInfo>> + Send;
}

/// Request body for registering a sensor.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewSensor {
    pub name: String,
    pub sensor_type: SensorType,
    /// Defaults to the canonical unit of `sensor_type`.
    pub unit: Option<String>,
    pub location: String,
    pub description: Option<String>,
}

/// In-process sensor registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct SensorRegistry {
    inner: Arc<RwLock<BTreeMap<i64, Sensor>>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new sensor under the next free id.
    ///
    /// `publish` runs under the registry write lock, before the sensor becomes
    /// visible to lookups. Anything it sets up (store series, journal entry)
    /// is therefore in place before the first reading can be accepted.
    pub async fn register<F, Fut>(&self, new: NewSensor, publish: F) -> CoreResult<Sensor>
    where
        F: FnOnce(Sensor) -> Fut,
        Fut: Future<Output = ()>,
    {
        if new.name.trim().is_empty() {
            return Err(CoreError::validation("sensor name must not be empty"));
        }

        let mut sensors = self.inner.write().await;
        let id = match sensors.keys().next_back() {
            None => 1,
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| CoreError::validation("sensor id space exhausted"))?,
        };
        let sensor = Sensor {
            id,
            name: new.name,
            unit: new
                .unit
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| new.sensor_type.default_unit().to_owned()),
            sensor_type: new.sensor_type,
            location: new.location,
            description: new.description,
            created_at: Utc::now(),
        };
        publish(sensor.clone()).await;
        sensors.insert(id, sensor.clone());
        Ok(sensor)
    }

    /// Insert a sensor with a caller-chosen id (configuration seed or journal
    /// replay). Fails if the id is taken. `publish` runs as in [`register`].
    ///
    /// [`register`]: Self::register
    pub async fn insert<F, Fut>(&self, sensor: Sensor, publish: F) -> CoreResult<()>
    where
        F: FnOnce(Sensor) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut sensors = self.inner.write().await;
        if sensors.contains_key(&sensor.id) {
            return Err(CoreError::validation(format!(
                "sensor id {} is already registered",
                sensor.id
            )));
        }
        publish(sensor.clone()).await;
        sensors.insert(sensor.id, sensor);
        Ok(())
    }

    pub async fn get(&self, id: i64) -> CoreResult<Sensor> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::UnknownSensor(id))
    }

    /// All sensors ordered by id.
    pub async fn list(&self) -> Vec<Sensor> {
        self.inner.read().await.values().cloned().collect()
    }
}

impl SensorLookup for SensorRegistry {
    async fn lookup_sensor(&self, id: i64) -> CoreResult<SensorInfo> {
        let sensors = self.inner.read().await;
        let sensor = sensors.get(&id).ok_or(CoreError::UnknownSensor(id))?;
        Ok(SensorInfo {
            sensor_type: sensor.sensor_type,
            unit: sensor.unit.clone(),
        })
    }
}
