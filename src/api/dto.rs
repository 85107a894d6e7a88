use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::{Reading, Sensor, SensorType},
    timeseries::Interval,
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(alias = "from")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(alias = "to")]
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub interval: Option<Interval>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    /// Comma-separated sensor ids, e.g. `1,2,3`.
    pub sensor_ids: String,
    #[serde(alias = "from")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(alias = "to")]
    pub end_date: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body for `POST /sensors/{sensor_id}/readings`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewReadingDto {
    pub value: f64,
    /// Defaults to the time the reading is received.
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional declared type, checked against the sensor's registered type.
    pub sensor_type: Option<String>,
}

/// Body for `POST /history/query`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryQuery {
    pub sensor_ids: Vec<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub interval: Interval,
}

/// Body for `POST /actuators/{actuator_id}/control`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ControlRequest {
    /// `true` = on, `false` = off.
    pub state: bool,
    /// Analog level for variable actuators (e.g. intensity).
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorDetailDto {
    #[serde(flatten)]
    pub sensor: Sensor,
    pub last_reading: Option<Reading>,
}

/// Entry of the telemetry bridge's sensor-type catalogue.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BridgeSensorTypeDto {
    pub name: String,
    /// Code used in `BridgeReading::sensor_type`.
    pub code: String,
    pub sensor_type: SensorType,
    pub unit: String,
}

impl BridgeSensorTypeDto {
    /// Probe codes accepted from the bridge (Atlas Scientific probe set).
    pub fn catalogue() -> Vec<Self> {
        [
            ("pH", "ph", SensorType::Ph),
            ("Electrical conductivity", "ec", SensorType::Ec),
            ("Dissolved oxygen", "do", SensorType::Do),
            ("RTD temperature", "rtd", SensorType::Temperature),
            ("Oxidation-reduction potential", "orp", SensorType::Orp),
            ("Carbon dioxide", "co2", SensorType::Co2),
        ]
        .into_iter()
        .map(|(name, code, sensor_type)| Self {
            name: name.to_owned(),
            code: code.to_owned(),
            sensor_type,
            unit: sensor_type.default_unit().to_owned(),
        })
        .collect()
    }
}
