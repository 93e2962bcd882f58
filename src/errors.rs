/*!
 * Error types for the lingocap backend.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors raised by inference engines and their loaders
#[derive(Error, Debug)]
pub enum EngineError {
    /// Model weights could not be loaded (missing files, out of memory)
    #[error("failed to load model '{model_id}': {reason}")]
    LoadFailed {
        /// Model identifier that failed to load
        model_id: String,
        /// Human-readable failure reason
        reason: String,
    },

    /// Inference call failed at runtime
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Application-level error kinds, one variant per failure class the
/// HTTP surface can report
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or missing input path, unparseable subtitle file, unknown job id
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A job of the same kind is already in flight
    #[error("busy: {0}")]
    Busy(String),

    /// Unknown model id for the requested role
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Model load failed, the role was left unloaded
    #[error("model load failure: {0}")]
    ModelLoadFailure(String),

    /// Runtime inference failure mid-job
    #[error("inference failure: {0}")]
    InferenceFailure(String),

    /// The job was cancelled by an explicit cancel call
    #[error("cancelled by user")]
    CancelledByUser,

    /// Read/write/parse failure on a subtitle or output path
    #[error("io failure: {0}")]
    IoFailure(String),
}

impl AppError {
    /// Stable machine-readable kind string, used in progress events and
    /// HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Busy(_) => "Busy",
            AppError::InvalidModel(_) => "InvalidModel",
            AppError::ModelLoadFailure(_) => "ModelLoadFailure",
            AppError::InferenceFailure(_) => "InferenceFailure",
            AppError::CancelledByUser => "CancelledByUser",
            AppError::IoFailure(_) => "IOFailure",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::InvalidModel(_) => StatusCode::BAD_REQUEST,
            AppError::Busy(_) | AppError::CancelledByUser => StatusCode::CONFLICT,
            AppError::ModelLoadFailure(_)
            | AppError::InferenceFailure(_)
            | AppError::IoFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::LoadFailed { .. } => AppError::ModelLoadFailure(err.to_string()),
            EngineError::InferenceFailed(msg) => AppError::InferenceFailure(msg),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoFailure(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Result alias for application-level operations
pub type AppResult<T> = Result<T, AppError>;
