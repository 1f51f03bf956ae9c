//! Error types for the delivery pipeline
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Pipeline Error Enum ==
/// Failure of one pipeline stage.
///
/// Cloned to every waiter coalesced onto the failed pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Backing resource absent or unreadable
    #[error("The file at URL {url} does not exist")]
    Read { url: String, message: String },

    /// Preprocessing transform failed
    #[error("Failed to preprocess {url}: {message}")]
    Prep { url: String, message: String },

    /// Compression codec failed
    #[error("Failed to compress {url}: {message}")]
    Compress { url: String, message: String },
}

impl PipelineError {
    /// HTTP status the failure surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Read { .. } => StatusCode::NOT_FOUND,
            PipelineError::Prep { .. } | PipelineError::Compress { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PipelineError::Read { url, .. }
            | PipelineError::Prep { url, .. }
            | PipelineError::Compress { url, .. } => url,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string()
        }));

        (self.status(), body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let read = PipelineError::Read {
            url: "/a".to_string(),
            message: "No such file".to_string(),
        };
        let prep = PipelineError::Prep {
            url: "/a".to_string(),
            message: "bad template".to_string(),
        };
        let compress = PipelineError::Compress {
            url: "/a".to_string(),
            message: "codec".to_string(),
        };

        assert_eq!(read.status(), StatusCode::NOT_FOUND);
        assert_eq!(prep.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(compress.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read.url(), "/a");
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let error = PipelineError::Read {
            url: "/missing.css".to_string(),
            message: "No such file".to_string(),
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["error"].as_str().unwrap().contains("/missing.css"));
    }
}
