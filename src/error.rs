use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::recording::{RecorderError, SessionError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidState(#[from] SessionError),

    #[error("Browser automation error: {0}")]
    BrowserError(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RecorderError> for AppError {
    fn from(err: RecorderError) -> Self {
        match err {
            RecorderError::Session(e) => AppError::InvalidState(e),
            RecorderError::Browser(e) => AppError::BrowserError(format!("{:#}", e)),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::InvalidState(_) => (StatusCode::CONFLICT, "Invalid State"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::BrowserError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Browser Error"),
            AppError::CredentialStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Credential Store Error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
