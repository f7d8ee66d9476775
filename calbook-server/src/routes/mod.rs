pub mod events;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use calbook_core::CalendarError;
use serde::Serialize;

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps calendar errors onto HTTP statuses
pub struct AppError(CalendarError);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0 {
            CalendarError::TimeBusy => StatusCode::CONFLICT,
            CalendarError::NotFound(_) => StatusCode::NOT_FOUND,
            CalendarError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        Self(err)
    }
}
