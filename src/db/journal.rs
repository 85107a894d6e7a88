//! Write-behind persistence of every accepted mutation.
//!
//! The in-memory stores answer every query. The journal exists so a restart
//! can rebuild them: mutations are queued on a bounded channel and written
//! to Postgres by a single background task. Write failures are logged and
//! never reach the request that caused them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::{
    Actuator, ActuatorStateEvent, ConfidenceInterval, PredictedPoint, PredictionResult,
    PredictionStatus, Reading, Sensor, TimeHorizon,
};

#[derive(Debug, Clone)]
pub enum JournalEntry {
    SensorRegistered(Sensor),
    ReadingsAppended(Vec<Reading>),
    ActuatorRegistered(Actuator),
    /// The actuator row after the change, plus the event that caused it.
    ActuatorControlled {
        actuator: Actuator,
        event: ActuatorStateEvent,
    },
    PredictionStored(PredictionResult),
}

impl JournalEntry {
    fn kind(&self) -> &'static str {
        match self {
            JournalEntry::SensorRegistered(_) => "sensor_registered",
            JournalEntry::ReadingsAppended(_) => "readings_appended",
            JournalEntry::ActuatorRegistered(_) => "actuator_registered",
            JournalEntry::ActuatorControlled { .. } => "actuator_controlled",
            JournalEntry::PredictionStored(_) => "prediction_stored",
        }
    }
}

/// Handle for queueing journal entries. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Journal {
    tx: mpsc::Sender<JournalEntry>,
}

impl Journal {
    /// Spawn the writer task. It exits once every `Journal` clone is dropped
    /// and the queue is drained.
    pub fn spawn(pool: PgPool, buffer: usize) -> (Self, JoinHandle<()>) {
        let (journal, rx) = Self::channel(buffer);
        let handle = tokio::spawn(run_writer(pool, rx));
        (journal, handle)
    }

    /// A journal handle and the receiving end of its queue, with no writer
    /// attached. Entries arrive in the order they were recorded.
    pub(crate) fn channel(buffer: usize) -> (Self, mpsc::Receiver<JournalEntry>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub async fn record(&self, entry: JournalEntry) {
        let kind = entry.kind();
        if self.tx.send(entry).await.is_err() {
            warn!(kind, "Journal writer has stopped; entry dropped");
        }
    }
}

async fn run_writer(pool: PgPool, mut rx: mpsc::Receiver<JournalEntry>) {
    info!("Journal writer started");
    while let Some(entry) = rx.recv().await {
        let kind = entry.kind();
        match write_entry(&pool, &entry).await {
            Ok(()) => debug!(kind, "Journal entry written"),
            Err(e) => error!(kind, error = %e, "Failed to write journal entry"),
        }
    }
    info!("Journal writer stopped");
}

async fn write_entry(pool: &PgPool, entry: &JournalEntry) -> Result<()> {
    match entry {
        JournalEntry::SensorRegistered(s) => {
            sqlx::query(
                "INSERT INTO sensors (id, name, sensor_type, unit, location, description, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(s.id)
            .bind(&s.name)
            .bind(s.sensor_type)
            .bind(&s.unit)
            .bind(&s.location)
            .bind(&s.description)
            .bind(s.created_at)
            .execute(pool)
            .await?;
        }

        JournalEntry::ReadingsAppended(readings) => {
            let mut tx = pool.begin().await?;
            for r in readings {
                sqlx::query(
                    "INSERT INTO sensor_readings (sensor_id, sequence, value, recorded_at, status) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (sensor_id, sequence) DO NOTHING",
                )
                .bind(r.sensor_id)
                .bind(r.sequence)
                .bind(r.value)
                .bind(r.recorded_at)
                .bind(r.status)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }

        JournalEntry::ActuatorRegistered(a) => {
            sqlx::query(
                "INSERT INTO actuators \
                     (id, name, actuator_type, location, description, created_at, \
                      is_active, current_state, last_activated, value) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(a.id)
            .bind(&a.name)
            .bind(&a.actuator_type)
            .bind(&a.location)
            .bind(&a.description)
            .bind(a.created_at)
            .bind(a.is_active)
            .bind(a.current_state)
            .bind(a.last_activated)
            .bind(a.value)
            .execute(pool)
            .await?;
        }

        JournalEntry::ActuatorControlled { actuator, event } => {
            let mut tx = pool.begin().await?;
            sqlx::query(
                "UPDATE actuators SET current_state = $2, last_activated = $3, value = $4 \
                 WHERE id = $1",
            )
            .bind(actuator.id)
            .bind(actuator.current_state)
            .bind(actuator.last_activated)
            .bind(actuator.value)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO actuator_events (actuator_id, state, value, recorded_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(event.actuator_id)
            .bind(event.state)
            .bind(event.value)
            .bind(event.recorded_at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }

        JournalEntry::PredictionStored(p) => {
            sqlx::query(
                "INSERT INTO predictions \
                     (id, sensor_id, prediction_type, time_horizon, predicted_values, \
                      confidence_interval, created_at, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(p.id)
            .bind(p.sensor_id)
            .bind(&p.prediction_type)
            .bind(p.time_horizon)
            .bind(Json(p.predicted_values.clone()))
            .bind(p.confidence_interval.clone().map(Json))
            .bind(p.created_at)
            .bind(p.status)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Startup hydration
// ---------------------------------------------------------------------------

/// Everything the journal holds, in replay order.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub sensors: Vec<Sensor>,
    /// Ordered by `(sensor_id, recorded_at, sequence)`.
    pub readings: Vec<Reading>,
    pub actuators: Vec<Actuator>,
    /// Ordered by actuator, oldest first.
    pub actuator_events: Vec<ActuatorStateEvent>,
    /// In store order.
    pub predictions: Vec<PredictionResult>,
}

#[derive(FromRow)]
struct PredictionRow {
    id: Uuid,
    sensor_id: i64,
    prediction_type: String,
    time_horizon: TimeHorizon,
    predicted_values: Json<Vec<PredictedPoint>>,
    confidence_interval: Option<Json<ConfidenceInterval>>,
    created_at: DateTime<Utc>,
    status: PredictionStatus,
}

impl From<PredictionRow> for PredictionResult {
    fn from(r: PredictionRow) -> Self {
        Self {
            id: r.id,
            sensor_id: r.sensor_id,
            prediction_type: r.prediction_type,
            time_horizon: r.time_horizon,
            predicted_values: r.predicted_values.0,
            confidence_interval: r.confidence_interval.map(|j| j.0),
            created_at: r.created_at,
            status: r.status,
        }
    }
}

pub async fn load_snapshot(pool: &PgPool) -> Result<Snapshot> {
    let sensors = sqlx::query_as::<_, Sensor>(
        "SELECT id, name, sensor_type, unit, location, description, created_at \
         FROM sensors ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("failed to load sensors")?;

    let readings = sqlx::query_as::<_, Reading>(
        "SELECT sensor_id, sequence, value, recorded_at, status \
         FROM sensor_readings ORDER BY sensor_id, recorded_at, sequence",
    )
    .fetch_all(pool)
    .await
    .context("failed to load sensor readings")?;

    let actuators = sqlx::query_as::<_, Actuator>(
        "SELECT id, name, actuator_type, location, description, created_at, \
                is_active, current_state, last_activated, value \
         FROM actuators ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("failed to load actuators")?;

    let actuator_events = sqlx::query_as::<_, ActuatorStateEvent>(
        "SELECT actuator_id, state, value, recorded_at \
         FROM actuator_events ORDER BY actuator_id, id",
    )
    .fetch_all(pool)
    .await
    .context("failed to load actuator events")?;

    let predictions = sqlx::query_as::<_, PredictionRow>(
        "SELECT id, sensor_id, prediction_type, time_horizon, predicted_values, \
                confidence_interval, created_at, status \
         FROM predictions ORDER BY seq",
    )
    .fetch_all(pool)
    .await
    .context("failed to load predictions")?
    .into_iter()
    .map(Into::into)
    .collect();

    Ok(Snapshot {
        sensors,
        readings,
        actuators,
        actuator_events,
        predictions,
    })
}
