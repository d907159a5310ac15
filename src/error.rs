use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced by page handlers
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("No image in upload")]
    MissingImage,
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        AppError::MalformedUpload(e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            AppError::MissingImage => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}
