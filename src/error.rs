use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::SensorType;

/// Errors returned by the telemetry core.
///
/// Every variant is recoverable at the caller boundary. The HTTP layer maps
/// them onto status codes in `api::errors`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("unknown sensor: {0}")]
    UnknownSensor(i64),

    #[error("unknown actuator: {0}")]
    UnknownActuator(i64),

    #[error("sensor {sensor_id} is registered as {registered}, reading declared {declared}")]
    TypeMismatch {
        sensor_id: i64,
        registered: SensorType,
        declared: SensorType,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("duplicate reading for sensor {sensor_id} at {timestamp}")]
    Duplicate {
        sensor_id: i64,
        timestamp: DateTime<Utc>,
    },
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
