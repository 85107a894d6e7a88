pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{routing::{get, post}, Router};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::state::AppState;
use handlers::ApiDoc;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/sensors", get(handlers::list_sensors).post(handlers::create_sensor))
        .route("/sensors/{sensor_id}", get(handlers::get_sensor))
        .route(
            "/sensors/{sensor_id}/readings",
            get(handlers::get_sensor_readings).post(handlers::add_sensor_reading),
        )
        .route("/readings", post(handlers::ingest_readings))
        .route("/bridge/readings", post(handlers::ingest_bridge_readings))
        .route("/bridge/sensor-types", get(handlers::bridge_sensor_types))
        .route("/history/sensors/{sensor_id}", get(handlers::get_sensor_history))
        .route("/history/query", post(handlers::query_history))
        .route("/history/summary", get(handlers::get_history_summary))
        .route(
            "/actuators",
            get(handlers::list_actuators).post(handlers::create_actuator),
        )
        .route("/actuators/{actuator_id}", get(handlers::get_actuator))
        .route("/actuators/{actuator_id}/control", post(handlers::control_actuator))
        .route("/actuators/{actuator_id}/history", get(handlers::get_actuator_history))
        .route("/predictions", post(handlers::store_prediction))
        .route("/predictions/{sensor_id}", get(handlers::get_sensor_predictions))
        .route(
            "/predictions/{sensor_id}/{prediction_type}",
            get(handlers::get_latest_prediction),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
