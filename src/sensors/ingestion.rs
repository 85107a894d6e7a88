use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::{classification::ThresholdTable, registry::SensorLookup};
use crate::{
    db::models::{Reading, SensorType},
    error::CoreError,
    timeseries::store::TimeSeriesStore,
};

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// A reading as posted by a sensor or relayed by the telemetry bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RawReading {
    pub sensor_id: i64,
    /// Caller-declared sensor type. When present it must match the registry.
    #[serde(default)]
    pub sensor_type: Option<String>,
    pub value: f64,
    /// Defaults to the ingestion instant.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Reading format pushed by the telemetry bridge (hardware control
/// platform). Sensor ids arrive as strings and types as probe codes.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BridgeReading {
    pub sensor_id: String,
    /// Probe code, e.g. `ph`, `ec`, `do`, `rtd`, `orp`, `co2`.
    pub sensor_type: String,
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl BridgeReading {
    fn normalize(self) -> Result<RawReading, String> {
        let sensor_id = self
            .sensor_id
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("sensor id {:?} is not numeric", self.sensor_id))?;

        debug!(
            sensor_id,
            unit = ?self.unit,
            location = ?self.location,
            "Normalised bridge reading"
        );

        Ok(RawReading {
            sensor_id,
            sensor_type: Some(self.sensor_type),
            value: self.value,
            timestamp: self.timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UnknownSensor,
    InvalidSensorId,
    UnknownSensorType,
    TypeMismatch,
    InvalidValue,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RejectedReading {
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub sensor_id: Option<i64>,
    pub reason: RejectReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestResult {
    pub accepted: usize,
    /// Stored readings, with assigned sequence and status.
    pub readings: Vec<Reading>,
    pub rejected: Vec<RejectedReading>,
}

impl IngestResult {
    fn reject(&mut self, index: usize, sensor_id: Option<i64>, reason: RejectReason, detail: String) {
        debug!(index, sensor_id = ?sensor_id, reason = ?reason, detail = %detail, "Reading rejected");
        self.rejected.push(RejectedReading { index, sensor_id, reason, detail });
    }
}

fn reason_for(err: &CoreError) -> RejectReason {
    match err {
        CoreError::UnknownSensor(_) => RejectReason::UnknownSensor,
        CoreError::TypeMismatch { .. } => RejectReason::TypeMismatch,
        CoreError::Duplicate { .. } => RejectReason::Duplicate,
        CoreError::UnknownActuator(_) | CoreError::NotFound(_) | CoreError::Validation(_) => {
            RejectReason::InvalidValue
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Validates, classifies, and stores inbound readings.
///
/// A batch is processed item by item in submission order; an invalid item is
/// reported in the result and never aborts the rest of the batch.
#[derive(Clone)]
pub struct IngestionGateway<L> {
    lookup: L,
    thresholds: Arc<ThresholdTable>,
    store: TimeSeriesStore,
}

impl<L: SensorLookup> IngestionGateway<L> {
    pub fn new(lookup: L, thresholds: Arc<ThresholdTable>, store: TimeSeriesStore) -> Self {
        Self { lookup, thresholds, store }
    }

    pub async fn ingest(&self, batch: Vec<RawReading>) -> IngestResult {
        self.ingest_items(batch.into_iter().map(Ok).enumerate()).await
    }

    /// Ingest telemetry-bridge readings. Items whose sensor id is not numeric
    /// are rejected with `InvalidSensorId`.
    pub async fn ingest_bridge(&self, batch: Vec<BridgeReading>) -> IngestResult {
        self.ingest_items(batch.into_iter().map(BridgeReading::normalize).enumerate())
            .await
    }

    async fn ingest_items(
        &self,
        items: impl Iterator<Item = (usize, Result<RawReading, String>)>,
    ) -> IngestResult {
        let mut result = IngestResult::default();
        let now = Utc::now();

        for (index, item) in items {
            let raw = match item {
                Ok(raw) => raw,
                Err(detail) => {
                    result.reject(index, None, RejectReason::InvalidSensorId, detail);
                    continue;
                }
            };
            match self.ingest_one(&raw, now).await {
                Ok(reading) => result.readings.push(reading),
                Err((reason, detail)) => result.reject(index, Some(raw.sensor_id), reason, detail),
            }
        }

        result.accepted = result.readings.len();
        if result.rejected.is_empty() {
            info!(accepted = result.accepted, "Ingested batch");
        } else {
            warn!(
                accepted = result.accepted,
                rejected = result.rejected.len(),
                "Ingested batch with rejections"
            );
        }
        result
    }

    async fn ingest_one(
        &self,
        raw: &RawReading,
        now: DateTime<Utc>,
    ) -> Result<Reading, (RejectReason, String)> {
        let reject = |e: CoreError| (reason_for(&e), e.to_string());

        let info = self.lookup.lookup_sensor(raw.sensor_id).await.map_err(reject)?;

        if let Some(declared) = raw.sensor_type.as_deref() {
            let declared = declared
                .parse::<SensorType>()
                .map_err(|e| (RejectReason::UnknownSensorType, e.to_string()))?;
            if declared != info.sensor_type {
                return Err(reject(CoreError::TypeMismatch {
                    sensor_id: raw.sensor_id,
                    registered: info.sensor_type,
                    declared,
                }));
            }
        }

        if !raw.value.is_finite() {
            return Err((
                RejectReason::InvalidValue,
                format!("value {} is not a finite number", raw.value),
            ));
        }

        let status = self.thresholds.classify(info.sensor_type, raw.value);
        let recorded_at = raw.timestamp.unwrap_or(now);

        self.store
            .append(raw.sensor_id, recorded_at, raw.value, status)
            .await
            .map_err(reject)
    }
}
