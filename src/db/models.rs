use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// SensorType
// ---------------------------------------------------------------------------

/// Mirrors the `sensor_type` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "sensor_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    SoilMoisture,
    Ph,
    /// Electrical conductivity
    Ec,
    /// Dissolved oxygen
    Do,
    /// Oxidation-reduction potential
    Orp,
    Co2,
    Light,
}

impl SensorType {
    pub const ALL: [SensorType; 8] = [
        SensorType::Temperature,
        SensorType::SoilMoisture,
        SensorType::Ph,
        SensorType::Ec,
        SensorType::Do,
        SensorType::Orp,
        SensorType::Co2,
        SensorType::Light,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::SoilMoisture => "soil_moisture",
            SensorType::Ph => "ph",
            SensorType::Ec => "ec",
            SensorType::Do => "do",
            SensorType::Orp => "orp",
            SensorType::Co2 => "co2",
            SensorType::Light => "light",
        }
    }

    /// Unit used when a sensor is registered without one.
    pub fn default_unit(&self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::SoilMoisture => "%",
            SensorType::Ph => "pH",
            SensorType::Ec => "μS/cm",
            SensorType::Do => "mg/L",
            SensorType::Orp => "mV",
            SensorType::Co2 => "ppm",
            SensorType::Light => "lux",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = CoreError;

    /// Accepts the canonical snake_case names plus the telemetry bridge's
    /// probe codes (`rtd` is an RTD temperature probe).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "rtd" => Ok(Self::Temperature),
            "soil_moisture" => Ok(Self::SoilMoisture),
            "ph" => Ok(Self::Ph),
            "ec" => Ok(Self::Ec),
            "do" => Ok(Self::Do),
            "orp" => Ok(Self::Orp),
            "co2" => Ok(Self::Co2),
            "light" => Ok(Self::Light),
            other => Err(CoreError::validation(format!("unknown sensor type: {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status tier of a reading, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "reading_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Normal,
    Warning,
    Critical,
}

// ---------------------------------------------------------------------------
// Sensors and readings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Sensor {
    pub id: i64,
    pub name: String,
    pub sensor_type: SensorType,
    /// Display unit, e.g. `°C`, `%`, `pH`.
    pub unit: String,
    pub location: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored measurement. Immutable once appended.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub sensor_id: i64,
    /// Per-sensor insertion sequence; tie-breaks equal timestamps.
    pub sequence: i64,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub status: Status,
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Actuator {
    pub id: i64,
    pub name: String,
    /// Free-form kind: `pump`, `light`, `fan`, `heater`, ...
    pub actuator_type: String,
    pub location: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub current_state: bool,
    pub last_activated: Option<DateTime<Utc>>,
    /// Analog level for variable actuators (e.g. light intensity).
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ActuatorStateEvent {
    pub actuator_id: i64,
    pub state: bool,
    pub value: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "prediction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Success,
    Failed,
    Processing,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "time_horizon")]
pub enum TimeHorizon {
    #[serde(rename = "1h")]
    #[sqlx(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    #[sqlx(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    #[sqlx(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    #[sqlx(rename = "7d")]
    SevenDays,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictedPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Lower/upper bounds, index-aligned with `PredictionResult::predicted_values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConfidenceInterval {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// A finished prediction as produced by the external prediction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictionResult {
    pub id: Uuid,
    pub sensor_id: i64,
    pub prediction_type: String,
    pub time_horizon: TimeHorizon,
    pub predicted_values: Vec<PredictedPoint>,
    pub confidence_interval: Option<ConfidenceInterval>,
    pub created_at: DateTime<Utc>,
    pub status: PredictionStatus,
}
