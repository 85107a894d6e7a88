use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::CoreError;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<CoreError>() {
            Some(CoreError::UnknownSensor(_))
            | Some(CoreError::UnknownActuator(_))
            | Some(CoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(CoreError::TypeMismatch { .. }) | Some(CoreError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Some(CoreError::Duplicate { .. }) => StatusCode::CONFLICT,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
