use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::models::{ConfidenceInterval, PredictedPoint, PredictionResult, PredictionStatus, TimeHorizon},
    error::{CoreError, CoreResult},
};

/// Prediction payload as pushed by the prediction engine.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPrediction {
    pub sensor_id: i64,
    pub prediction_type: String,
    pub time_horizon: TimeHorizon,
    pub predicted_values: Vec<PredictedPoint>,
    #[serde(default)]
    pub confidence_interval: Option<ConfidenceInterval>,
    /// Defaults to the time the cache receives the result.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_status")]
    pub status: PredictionStatus,
}

fn default_status() -> PredictionStatus {
    PredictionStatus::Success
}

/// Prediction types the prediction engine produces.
pub const PREDICTION_TYPES: [&str; 5] = ["temperature", "humidity", "ph", "soil_moisture", "light"];

impl NewPrediction {
    fn validate(&self) -> CoreResult<()> {
        if !PREDICTION_TYPES.contains(&self.prediction_type.as_str()) {
            return Err(CoreError::validation(format!(
                "unknown prediction_type {:?}; expected one of: {}",
                self.prediction_type,
                PREDICTION_TYPES.join(", ")
            )));
        }
        if let Some(ci) = &self.confidence_interval {
            let n = self.predicted_values.len();
            if ci.lower.len() != n || ci.upper.len() != n {
                return Err(CoreError::validation(format!(
                    "confidence interval has {} lower / {} upper bounds for {n} predicted values",
                    ci.lower.len(),
                    ci.upper.len()
                )));
            }
        }
        Ok(())
    }
}

/// Every prediction result in store order, indexed by sensor and by
/// `(sensor_id, prediction_type)`.
///
/// Results are append-only; the newest by `created_at` wins on lookup, with
/// store order breaking exact ties.
#[derive(Clone, Default)]
pub struct PredictionCache {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    results: Vec<PredictionResult>,
    by_key: HashMap<(i64, String), Vec<usize>>,
    by_sensor: HashMap<i64, Vec<usize>>,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a new result.
    pub async fn store(&self, new: NewPrediction) -> CoreResult<PredictionResult> {
        new.validate()?;
        let result = PredictionResult {
            id: Uuid::new_v4(),
            sensor_id: new.sensor_id,
            prediction_type: new.prediction_type,
            time_horizon: new.time_horizon,
            predicted_values: new.predicted_values,
            confidence_interval: new.confidence_interval,
            created_at: new.created_at.unwrap_or_else(Utc::now),
            status: new.status,
        };
        self.insert(result.clone()).await;
        Ok(result)
    }

    /// Append an already-built result (journal replay).
    pub async fn insert(&self, result: PredictionResult) {
        let mut inner = self.inner.write().await;
        let idx = inner.results.len();
        inner
            .by_key
            .entry((result.sensor_id, result.prediction_type.clone()))
            .or_default()
            .push(idx);
        inner.by_sensor.entry(result.sensor_id).or_default().push(idx);
        inner.results.push(result);
    }

    /// Latest result for `(sensor_id, prediction_type)`.
    pub async fn latest(&self, sensor_id: i64, prediction_type: &str) -> CoreResult<PredictionResult> {
        let inner = self.inner.read().await;
        inner
            .by_key
            .get(&(sensor_id, prediction_type.to_owned()))
            .and_then(|indices| {
                indices
                    .iter()
                    .map(|&idx| (idx, &inner.results[idx]))
                    .max_by_key(|(idx, r)| (r.created_at, *idx))
                    .map(|(_, r)| r.clone())
            })
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "no {prediction_type} prediction for sensor {sensor_id}"
                ))
            })
    }

    /// Every result for a sensor, in store order.
    pub async fn for_sensor(&self, sensor_id: i64) -> Vec<PredictionResult> {
        let inner = self.inner.read().await;
        inner
            .by_sensor
            .get(&sensor_id)
            .map(|indices| indices.iter().map(|&idx| inner.results[idx].clone()).collect())
            .unwrap_or_default()
    }
}
