use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Transport failure during connect/disconnect/play/stop
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid or missing credentials / player configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Capacity error: {required} handles required, {available} available")]
    Capacity { required: usize, available: usize },

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Capacity { .. } => "CAPACITY_ERROR",
            AppError::Settings(_) => "SETTINGS_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Connection(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) | AppError::Settings(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Capacity { .. } => StatusCode::CONFLICT,
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Connection(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code = %code, status = %status.as_u16(), message = %message, "API error");
        } else {
            tracing::debug!(code = %code, status = %status.as_u16(), message = %message, "API request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_maps_to_connection() {
        let err: AppError = TransportError::new(-3, "enter timeout").into();
        assert!(matches!(err, AppError::Connection(_)));
        assert_eq!(err.code(), "CONNECTION_ERROR");
        assert!(err.to_string().contains("enter timeout"));
    }

    #[test]
    fn test_capacity_error_message() {
        let err = AppError::Capacity {
            required: 7,
            available: 4,
        };
        assert_eq!(
            err.to_string(),
            "Capacity error: 7 handles required, 4 available"
        );
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
