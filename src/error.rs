//! Error taxonomy for the slip pipeline.
//!
//! Client-caused failures map to `400 Bad Request`, generation failures to
//! `500 Internal Server Error`. Cleanup failures have their own type and are
//! only ever logged.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use std::path::PathBuf;
use thiserror::Error;

use crate::ErrorResponse;

/// Errors that can end a batch.
#[derive(Debug, Error)]
pub enum SlipError {
    #[error("No file uploaded")]
    NoFile,
    #[error("Unsupported file format: '{0}'")]
    UnsupportedFormat(String),
    #[error("Invalid input file: {0}")]
    InvalidInput(String),
    #[error("No data found in file")]
    EmptyBatch,
    #[error("Rendering failed ({context}): {detail}")]
    RenderError { context: String, detail: String },
    #[error("Rendering timed out after {secs}s ({scope})")]
    RenderTimeout { scope: String, secs: u64 },
    #[error("Packaging failed: {0}")]
    PackagingError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlipError {
    /// A single record failed; `position` is its 0-based row index.
    pub fn record_failed(position: usize, detail: impl std::fmt::Display) -> Self {
        Self::RenderError {
            context: format!("record {}", position + 1),
            detail: detail.to_string(),
        }
    }

    /// The rendering engine itself failed, independent of any record.
    pub fn engine_failed(detail: impl std::fmt::Display) -> Self {
        Self::RenderError {
            context: "engine".to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SlipError::NoFile
            | SlipError::UnsupportedFormat(_)
            | SlipError::InvalidInput(_)
            | SlipError::EmptyBatch => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the uploader. Server-side details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            SlipError::NoFile => "No file uploaded".to_string(),
            SlipError::UnsupportedFormat(_) => "Unsupported file format".to_string(),
            SlipError::InvalidInput(_) => {
                "Invalid file format. Please ensure it's a valid Excel or CSV file.".to_string()
            }
            SlipError::EmptyBatch => "No data found in file".to_string(),
            SlipError::RenderTimeout { .. } => {
                "Document generation timed out. Please try again with fewer rows.".to_string()
            }
            _ => "Server error during processing".to_string(),
        }
    }
}

impl From<SlipError> for HttpResponse {
    fn from(error: SlipError) -> Self {
        HttpResponse::build(error.status_code()).json(ErrorResponse::new(&error.public_message()))
    }
}

/// A transient resource could not be released.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to remove working area {path:?}: {source}")]
    WorkingArea {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove uploaded file {path:?}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to shut down rendering engine: {0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_bad_request() {
        for error in [
            SlipError::NoFile,
            SlipError::UnsupportedFormat(".pdf".into()),
            SlipError::InvalidInput("bad zip".into()),
            SlipError::EmptyBatch,
        ] {
            assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_generation_errors_hide_details() {
        let error = SlipError::record_failed(2, "tab crashed");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "Server error during processing");
        assert_eq!(error.to_string(), "Rendering failed (record 3): tab crashed");
    }
}
