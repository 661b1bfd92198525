// Application error type and its mapping onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::image_processing::ImageProcessingError;

#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    BadRequest(String),
    NotFound(String),
    UnprocessableEntity(String),
}

// Implement conversion from anyhow::Error for easier error propagation
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<ImageProcessingError> for AppError {
    fn from(error: ImageProcessingError) -> Self {
        match error {
            ImageProcessingError::Decode(_) => AppError::UnprocessableEntity(error.to_string()),
            ImageProcessingError::InvalidOptions(_) => AppError::BadRequest(error.to_string()),
            ImageProcessingError::Encode(_) | ImageProcessingError::Task(_) => {
                AppError::InternalServerError(anyhow::Error::new(error))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(e) => {
                tracing::error!("Internal server error: {:?}", e);
                // Don't expose internal details to the client
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::BadRequest(message) => {
                tracing::warn!("Bad request: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::UnprocessableEntity(message) => {
                tracing::warn!("Unprocessable entity: {}", message);
                (StatusCode::UNPROCESSABLE_ENTITY, message)
            }
        };

        (status, Json(json!({ "success": false, "error": error_message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
