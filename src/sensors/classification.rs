use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::{SensorType, Status};

/// A value strictly below `below` or strictly above `above` falls in the
/// tier. A missing side never triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Band {
    #[serde(default)]
    pub below: Option<f64>,
    #[serde(default)]
    pub above: Option<f64>,
}

impl Band {
    pub const fn above(limit: f64) -> Self {
        Self { below: None, above: Some(limit) }
    }

    pub const fn below(limit: f64) -> Self {
        Self { below: Some(limit), above: None }
    }

    pub const fn outside(low: f64, high: f64) -> Self {
        Self { below: Some(low), above: Some(high) }
    }

    fn contains(&self, value: f64) -> bool {
        self.below.is_some_and(|b| value < b) || self.above.is_some_and(|a| value > a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub warning: Band,
    #[serde(default)]
    pub critical: Band,
}

/// Per-sensor-type thresholds used to classify readings at write time.
///
/// Deserializes from a JSON object keyed by sensor type:
///
/// ```json
/// { "temperature": { "warning": { "above": 30 }, "critical": { "above": 35 } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    table: BTreeMap<SensorType, Thresholds>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::empty()
            .with(
                SensorType::Temperature,
                Thresholds { warning: Band::above(30.0), critical: Band::above(35.0) },
            )
            .with(
                SensorType::SoilMoisture,
                Thresholds { warning: Band::below(40.0), critical: Band::below(20.0) },
            )
            .with(
                SensorType::Ph,
                Thresholds {
                    warning: Band::outside(6.0, 7.5),
                    critical: Band::outside(5.5, 8.0),
                },
            )
    }
}

impl ThresholdTable {
    pub fn empty() -> Self {
        Self { table: BTreeMap::new() }
    }

    pub fn with(mut self, sensor_type: SensorType, thresholds: Thresholds) -> Self {
        self.table.insert(sensor_type, thresholds);
        self
    }

    /// Load a table from a JSON file. Types in the file replace the defaults,
    /// types absent from the file keep their default thresholds.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read threshold file {}", path.display()))?;
        let overrides: ThresholdTable = serde_json::from_str(&raw)
            .with_context(|| format!("invalid threshold file {}", path.display()))?;

        let mut table = Self::default();
        table.table.extend(overrides.table);
        Ok(table)
    }

    pub fn get(&self, sensor_type: SensorType) -> Option<&Thresholds> {
        self.table.get(&sensor_type)
    }

    /// Sensor types with no configured thresholds.
    pub fn unconfigured(&self) -> Vec<SensorType> {
        SensorType::ALL
            .into_iter()
            .filter(|t| !self.table.contains_key(t))
            .collect()
    }

    /// Classify `value` for `sensor_type`. Critical is checked before warning.
    /// Unconfigured types are always `Normal`.
    pub fn classify(&self, sensor_type: SensorType, value: f64) -> Status {
        let Some(t) = self.table.get(&sensor_type) else {
            debug!(sensor_type = %sensor_type, "No thresholds configured; classifying as normal");
            return Status::Normal;
        };

        if t.critical.contains(value) {
            Status::Critical
        } else if t.warning.contains(value) {
            Status::Warning
        } else {
            Status::Normal
        }
    }
}
