use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use utoipa::OpenApi;

use super::{
    dto::{
        BridgeSensorTypeDto, ControlRequest, HistoryParams, HistoryQuery, LimitParams,
        NewReadingDto, SensorDetailDto, SummaryParams,
    },
    errors::AppError,
};
use crate::{
    control::registry::NewActuator,
    db::models::{
        Actuator, ActuatorStateEvent, ConfidenceInterval, PredictedPoint, PredictionResult,
        PredictionStatus, Reading, Sensor, SensorType, Status, TimeHorizon,
    },
    error::CoreError,
    prediction_cache::NewPrediction,
    sensors::{
        ingestion::{
            BridgeReading, IngestResult, RawReading, RejectReason, RejectedReading,
        },
        registry::NewSensor,
        service::SensorSummary,
    },
    state::AppState,
    timeseries::{Interval, Summary},
};

const DEFAULT_READINGS_LIMIT: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 100;
const DEFAULT_ACTUATOR_HISTORY_LIMIT: usize = 10;

/// Resolve an optional `[start, end]` window, defaulting to the
/// `default_span` ending now.
fn window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    default_span: Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = end.unwrap_or_else(Utc::now);
    let start = start.unwrap_or(end - default_span);
    (start, end)
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// List every registered sensor.
#[utoipa::path(
    get,
    path = "/sensors",
    responses(
        (status = 200, description = "Registered sensors", body = Vec<Sensor>),
    ),
    tag = "sensors"
)]
pub async fn list_sensors(State(state): State<AppState>) -> Json<Vec<Sensor>> {
    Json(state.sensors.list().await)
}

/// Register a new sensor.
#[utoipa::path(
    post,
    path = "/sensors",
    request_body = NewSensor,
    responses(
        (status = 201, description = "Sensor registered", body = Sensor),
        (status = 400, description = "Invalid sensor"),
    ),
    tag = "sensors"
)]
pub async fn create_sensor(
    State(state): State<AppState>,
    Json(body): Json<NewSensor>,
) -> Result<(StatusCode, Json<Sensor>), AppError> {
    let sensor = state.sensors.register(body).await?;
    Ok((StatusCode::CREATED, Json(sensor)))
}

/// Fetch a sensor together with its latest reading.
#[utoipa::path(
    get,
    path = "/sensors/{sensor_id}",
    params(("sensor_id" = i64, Path, description = "Sensor ID")),
    responses(
        (status = 200, description = "Sensor", body = SensorDetailDto),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
) -> Result<Json<SensorDetailDto>, AppError> {
    let sensor = state.sensors.get(sensor_id).await?;
    let last_reading = state.sensors.latest(sensor_id).await?;
    Ok(Json(SensorDetailDto { sensor, last_reading }))
}

/// Record a single reading for a sensor.
#[utoipa::path(
    post,
    path = "/sensors/{sensor_id}/readings",
    params(("sensor_id" = i64, Path, description = "Sensor ID")),
    request_body = NewReadingDto,
    responses(
        (status = 201, description = "Reading stored", body = Reading),
        (status = 400, description = "Reading rejected"),
        (status = 404, description = "Unknown sensor"),
        (status = 409, description = "Reading already stored for this timestamp"),
    ),
    tag = "sensors"
)]
pub async fn add_sensor_reading(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
    Json(body): Json<NewReadingDto>,
) -> Result<(StatusCode, Json<Reading>), AppError> {
    let timestamp = body.timestamp.unwrap_or_else(Utc::now);
    let mut result = state
        .sensors
        .ingest(vec![RawReading {
            sensor_id,
            sensor_type: body.sensor_type,
            value: body.value,
            timestamp: Some(timestamp),
        }])
        .await;

    if let Some(reading) = result.readings.pop() {
        return Ok((StatusCode::CREATED, Json(reading)));
    }

    let err = match result.rejected.pop() {
        Some(RejectedReading { reason: RejectReason::UnknownSensor, .. }) | None => {
            CoreError::UnknownSensor(sensor_id)
        }
        Some(RejectedReading { reason: RejectReason::Duplicate, .. }) => {
            CoreError::Duplicate { sensor_id, timestamp }
        }
        Some(rejected) => CoreError::Validation(rejected.detail),
    };
    Err(err.into())
}

/// The most recent readings of a sensor, oldest first. Defaults to 10.
#[utoipa::path(
    get,
    path = "/sensors/{sensor_id}/readings",
    params(
        ("sensor_id" = i64, Path, description = "Sensor ID"),
        ("limit" = Option<usize>, Query, description = "Number of readings (default 10)"),
    ),
    responses(
        (status = 200, description = "Readings", body = Vec<Reading>),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_readings(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_READINGS_LIMIT);
    Ok(Json(state.sensors.recent(sensor_id, limit).await?))
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Ingest a batch of readings. Invalid items are reported per item; the
/// batch itself always succeeds.
#[utoipa::path(
    post,
    path = "/readings",
    request_body = Vec<RawReading>,
    responses(
        (status = 200, description = "Per-item ingestion result", body = IngestResult),
    ),
    tag = "ingestion"
)]
pub async fn ingest_readings(
    State(state): State<AppState>,
    Json(batch): Json<Vec<RawReading>>,
) -> Json<IngestResult> {
    Json(state.sensors.ingest(batch).await)
}

/// Ingest readings pushed by the telemetry bridge.
#[utoipa::path(
    post,
    path = "/bridge/readings",
    request_body = Vec<BridgeReading>,
    responses(
        (status = 200, description = "Per-item ingestion result", body = IngestResult),
    ),
    tag = "ingestion"
)]
pub async fn ingest_bridge_readings(
    State(state): State<AppState>,
    Json(batch): Json<Vec<BridgeReading>>,
) -> Json<IngestResult> {
    Json(state.sensors.ingest_bridge(batch).await)
}

/// Sensor-type codes accepted from the telemetry bridge.
#[utoipa::path(
    get,
    path = "/bridge/sensor-types",
    responses(
        (status = 200, description = "Accepted probe codes", body = Vec<BridgeSensorTypeDto>),
    ),
    tag = "ingestion"
)]
pub async fn bridge_sensor_types() -> Json<Vec<BridgeSensorTypeDto>> {
    Json(BridgeSensorTypeDto::catalogue())
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Readings of a sensor over a time range, raw or downsampled. Defaults to
/// the last 24 hours and 100 points.
#[utoipa::path(
    get,
    path = "/history/sensors/{sensor_id}",
    params(
        ("sensor_id" = i64, Path, description = "Sensor ID"),
        ("start_date" = Option<DateTime<Utc>>, Query, description = "Start of range (RFC3339, inclusive); alias `from`"),
        ("end_date" = Option<DateTime<Utc>>, Query, description = "End of range (RFC3339, inclusive); alias `to`"),
        ("limit" = Option<usize>, Query, description = "Most recent points to keep (default 100)"),
        ("interval" = Option<Interval>, Query, description = "raw | hourly | daily | weekly"),
    ),
    responses(
        (status = 200, description = "Readings ordered by time", body = Vec<Reading>),
        (status = 400, description = "Invalid range"),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "history"
)]
pub async fn get_sensor_history(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let (start, end) = window(params.start_date, params.end_date, Duration::days(1));
    let readings = state
        .sensors
        .history(
            sensor_id,
            start,
            end,
            params.interval.unwrap_or_default(),
            Some(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)),
        )
        .await?;
    Ok(Json(readings))
}

/// Readings of several sensors over one range, keyed by sensor id.
#[utoipa::path(
    post,
    path = "/history/query",
    request_body = HistoryQuery,
    responses(
        (status = 200, description = "Readings per sensor, ordered by time", body = BTreeMap<i64, Vec<Reading>>),
        (status = 400, description = "Invalid range"),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "history"
)]
pub async fn query_history(
    State(state): State<AppState>,
    Json(query): Json<HistoryQuery>,
) -> Result<Json<BTreeMap<i64, Vec<Reading>>>, AppError> {
    let points = state
        .sensors
        .history_many(&query.sensor_ids, query.start_date, query.end_date, query.interval)
        .await?;
    Ok(Json(points))
}

/// min/max/avg/count per sensor over a window. Defaults to the last 7 days.
#[utoipa::path(
    get,
    path = "/history/summary",
    params(
        ("sensor_ids" = String, Query, description = "Comma-separated sensor IDs"),
        ("start_date" = Option<DateTime<Utc>>, Query, description = "Start of range (RFC3339, inclusive); alias `from`"),
        ("end_date" = Option<DateTime<Utc>>, Query, description = "End of range (RFC3339, inclusive); alias `to`"),
    ),
    responses(
        (status = 200, description = "One summary per sensor", body = Vec<SensorSummary>),
        (status = 400, description = "Invalid sensor list or range"),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "history"
)]
pub async fn get_history_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Vec<SensorSummary>>, AppError> {
    let sensor_ids = params
        .sensor_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| CoreError::validation(format!("invalid sensor id: {s:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (start, end) = window(params.start_date, params.end_date, Duration::days(7));
    Ok(Json(state.sensors.summarize_many(&sensor_ids, start, end).await?))
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

/// List every registered actuator.
#[utoipa::path(
    get,
    path = "/actuators",
    responses(
        (status = 200, description = "Registered actuators", body = Vec<Actuator>),
    ),
    tag = "actuators"
)]
pub async fn list_actuators(State(state): State<AppState>) -> Json<Vec<Actuator>> {
    Json(state.control.list().await)
}

/// Register a new actuator. It starts active and off.
#[utoipa::path(
    post,
    path = "/actuators",
    request_body = NewActuator,
    responses(
        (status = 201, description = "Actuator registered", body = Actuator),
        (status = 400, description = "Invalid actuator"),
    ),
    tag = "actuators"
)]
pub async fn create_actuator(
    State(state): State<AppState>,
    Json(body): Json<NewActuator>,
) -> Result<(StatusCode, Json<Actuator>), AppError> {
    let actuator = state.control.register(body).await?;
    Ok((StatusCode::CREATED, Json(actuator)))
}

#[utoipa::path(
    get,
    path = "/actuators/{actuator_id}",
    params(("actuator_id" = i64, Path, description = "Actuator ID")),
    responses(
        (status = 200, description = "Actuator", body = Actuator),
        (status = 404, description = "Unknown actuator"),
    ),
    tag = "actuators"
)]
pub async fn get_actuator(
    State(state): State<AppState>,
    Path(actuator_id): Path<i64>,
) -> Result<Json<Actuator>, AppError> {
    Ok(Json(state.control.get(actuator_id).await?))
}

/// Switch an actuator on or off, optionally setting its analog level.
#[utoipa::path(
    post,
    path = "/actuators/{actuator_id}/control",
    params(("actuator_id" = i64, Path, description = "Actuator ID")),
    request_body = ControlRequest,
    responses(
        (status = 200, description = "Recorded state change", body = ActuatorStateEvent),
        (status = 400, description = "Invalid value"),
        (status = 404, description = "Unknown actuator"),
    ),
    tag = "actuators"
)]
pub async fn control_actuator(
    State(state): State<AppState>,
    Path(actuator_id): Path<i64>,
    Json(body): Json<ControlRequest>,
) -> Result<Json<ActuatorStateEvent>, AppError> {
    Ok(Json(state.control.control(actuator_id, body.state, body.value).await?))
}

/// State changes of an actuator, newest first. Defaults to 10.
#[utoipa::path(
    get,
    path = "/actuators/{actuator_id}/history",
    params(
        ("actuator_id" = i64, Path, description = "Actuator ID"),
        ("limit" = Option<usize>, Query, description = "Number of events (default 10)"),
    ),
    responses(
        (status = 200, description = "State changes", body = Vec<ActuatorStateEvent>),
        (status = 404, description = "Unknown actuator"),
    ),
    tag = "actuators"
)]
pub async fn get_actuator_history(
    State(state): State<AppState>,
    Path(actuator_id): Path<i64>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<ActuatorStateEvent>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_ACTUATOR_HISTORY_LIMIT);
    Ok(Json(state.control.history(actuator_id, limit).await?))
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Store a finished prediction from the prediction engine.
#[utoipa::path(
    post,
    path = "/predictions",
    request_body = NewPrediction,
    responses(
        (status = 201, description = "Prediction stored", body = PredictionResult),
        (status = 400, description = "Invalid prediction"),
    ),
    tag = "predictions"
)]
pub async fn store_prediction(
    State(state): State<AppState>,
    Json(body): Json<NewPrediction>,
) -> Result<(StatusCode, Json<PredictionResult>), AppError> {
    let result = state.store_prediction(body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Every stored prediction for a sensor.
#[utoipa::path(
    get,
    path = "/predictions/{sensor_id}",
    params(("sensor_id" = i64, Path, description = "Sensor ID")),
    responses(
        (status = 200, description = "Predictions, oldest first", body = Vec<PredictionResult>),
    ),
    tag = "predictions"
)]
pub async fn get_sensor_predictions(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
) -> Json<Vec<PredictionResult>> {
    Json(state.predictions.for_sensor(sensor_id).await)
}

/// Latest prediction of a given type for a sensor.
#[utoipa::path(
    get,
    path = "/predictions/{sensor_id}/{prediction_type}",
    params(
        ("sensor_id" = i64, Path, description = "Sensor ID"),
        ("prediction_type" = String, Path, description = "Prediction type, e.g. temperature"),
    ),
    responses(
        (status = 200, description = "Latest prediction", body = PredictionResult),
        (status = 404, description = "No prediction found"),
    ),
    tag = "predictions"
)]
pub async fn get_latest_prediction(
    State(state): State<AppState>,
    Path((sensor_id, prediction_type)): Path<(i64, String)>,
) -> Result<Json<PredictionResult>, AppError> {
    Ok(Json(state.predictions.latest(sensor_id, &prediction_type).await?))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        list_sensors, create_sensor, get_sensor, add_sensor_reading, get_sensor_readings,
        ingest_readings, ingest_bridge_readings, bridge_sensor_types,
        get_sensor_history, query_history, get_history_summary,
        list_actuators, create_actuator, get_actuator, control_actuator, get_actuator_history,
        store_prediction, get_sensor_predictions, get_latest_prediction,
        health,
    ),
    components(schemas(
        Sensor, SensorType, Reading, Status, NewSensor, NewReadingDto, SensorDetailDto,
        RawReading, BridgeReading, IngestResult, RejectedReading, RejectReason,
        BridgeSensorTypeDto, Interval, Summary, SensorSummary, HistoryQuery,
        Actuator, ActuatorStateEvent, NewActuator, ControlRequest,
        PredictionResult, NewPrediction, PredictedPoint, ConfidenceInterval,
        PredictionStatus, TimeHorizon,
    )),
    tags(
        (name = "sensors",     description = "Sensor registry and readings"),
        (name = "ingestion",   description = "Batch and telemetry-bridge ingestion"),
        (name = "history",     description = "Range queries and summaries"),
        (name = "actuators",   description = "Actuator state and control history"),
        (name = "predictions", description = "Prediction results"),
        (name = "system",      description = "System endpoints"),
    ),
    info(
        title = "Greenhouse Telemetry API",
        version = "0.1.0",
        description = "Sensor telemetry ingestion, history, actuator state and prediction results"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
