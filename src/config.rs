use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::db::models::SensorType;

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// Sensor declared through `SENSORS`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSeed {
    pub id: i64,
    pub sensor_type: SensorType,
    pub location: String,
}

/// Actuator declared through `ACTUATORS`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorSeed {
    pub id: i64,
    pub actuator_type: String,
    pub location: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Enables the Postgres journal when set.
    pub database_url: Option<String>,
    /// Reject readings whose `(sensor_id, timestamp)` is already stored.
    pub ingest_dedup: bool,
    /// JSON file overriding the default classification thresholds.
    pub thresholds_file: Option<PathBuf>,
    /// Format: `"id:type[:location],..."` (e.g. `"1:temperature:Greenhouse 1,2:ph"`).
    pub sensors: Vec<SensorSeed>,
    /// Format: `"id:type[:location],..."` (e.g. `"1:pump:Greenhouse 1"`).
    pub actuators: Vec<ActuatorSeed>,
    /// Capacity of the journal write queue.
    pub journal_buffer: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            ingest_dedup: parse_bool(&optional("INGEST_DEDUP", "false"))
                .context("INGEST_DEDUP must be true or false")?,
            thresholds_file: std::env::var("SENSOR_THRESHOLDS_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            sensors: parse_sensor_seeds(&optional("SENSORS", ""))?,
            actuators: parse_actuator_seeds(&optional("ACTUATORS", ""))?,
            journal_buffer: optional("JOURNAL_BUFFER", "1024")
                .parse()
                .context("JOURNAL_BUFFER must be a positive integer")?,
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow::anyhow!("not a boolean: {other:?}")),
    }
}

/// Split `"id:type[:location]"` entries into their parts.
fn split_seed_entries<'a>(
    var: &'a str,
    raw: &'a str,
) -> impl Iterator<Item = Result<(i64, &'a str, &'a str)>> + 'a {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(move |entry| {
            let mut parts = entry.splitn(3, ':');
            let (Some(id), Some(kind)) = (parts.next(), parts.next()) else {
                anyhow::bail!("{var} entry must be 'id:type[:location]', got: {entry:?}");
            };
            let id = id
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid id in {var} entry {entry:?}"))?;
            let location = parts.next().unwrap_or("").trim();
            Ok((id, kind.trim(), location))
        })
}

fn parse_sensor_seeds(raw: &str) -> Result<Vec<SensorSeed>> {
    split_seed_entries("SENSORS", raw)
        .map(|entry| {
            let (id, kind, location) = entry?;
            let sensor_type = kind
                .parse::<SensorType>()
                .with_context(|| format!("unknown sensor type in SENSORS entry {id}:{kind}"))?;
            Ok(SensorSeed { id, sensor_type, location: location.to_owned() })
        })
        .collect()
}

fn parse_actuator_seeds(raw: &str) -> Result<Vec<ActuatorSeed>> {
    split_seed_entries("ACTUATORS", raw)
        .map(|entry| {
            let (id, kind, location) = entry?;
            if kind.is_empty() {
                anyhow::bail!("missing actuator type in ACTUATORS entry {id}");
            }
            Ok(ActuatorSeed { id, actuator_type: kind.to_owned(), location: location.to_owned() })
        })
        .collect()
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
