use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("detection {0} not found")]
    NotFound(i64),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("failed to read image: {0}")]
    Io(#[from] io::Error),

    #[error("request to classifier failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("No selected file")]
    EmptyFilename,

    #[error("Invalid file format")]
    InvalidFormat,

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("Failed to save upload: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by the request handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Prediction error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::Classify(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
