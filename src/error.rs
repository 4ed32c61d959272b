use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::artifact::ArtifactKind;

/// Error taxonomy for the coordination engine.
///
/// Every public operation on the controller and its collaborators returns
/// `Result<_, AfasError>`. The wire layer (`api::router`) maps each variant
/// to an HTTP status; the aggregate analyze response instead carries
/// `AnalyzerFailed`/`AnalyzerMissingArtifact` inline per analyzer rather than
/// failing the whole request.
#[derive(Debug, thiserror::Error)]
pub enum AfasError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-violation during `FirmwareStorage::store`. Never surfaced to a
    /// caller; the second writer treats this as success internally.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("derivation failed: {cause}")]
    DerivationFailed { cause: Box<AfasError> },

    #[error("analyzer '{id}' failed: {cause}")]
    AnalyzerFailed { id: String, cause: Box<AfasError> },

    #[error("analyzer '{id}' is missing required artifact '{kind:?}'")]
    AnalyzerMissingArtifact { id: String, kind: ArtifactKind },

    #[error("no such analyzer: {0}")]
    NoSuchAnalyzer(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("analyzer '{id}' timed out after {elapsed_ms}ms")]
    Timeout { id: String, elapsed_ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AfasError {
    pub fn derivation_failed(cause: AfasError) -> Self {
        AfasError::DerivationFailed {
            cause: Box::new(cause),
        }
    }

    pub fn analyzer_failed(id: impl Into<String>, cause: AfasError) -> Self {
        AfasError::AnalyzerFailed {
            id: id.into(),
            cause: Box::new(cause),
        }
    }

    /// Short, stable tag used in structured logs and the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AfasError::InvalidArgument(_) => "invalid_argument",
            AfasError::NotFound(_) => "not_found",
            AfasError::Conflict(_) => "conflict",
            AfasError::DerivationFailed { .. } => "derivation_failed",
            AfasError::AnalyzerFailed { .. } => "analyzer_failed",
            AfasError::AnalyzerMissingArtifact { .. } => "analyzer_missing_artifact",
            AfasError::NoSuchAnalyzer(_) => "no_such_analyzer",
            AfasError::Cancelled => "cancelled",
            AfasError::Timeout { .. } => "timeout",
            AfasError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AfasError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AfasError::NotFound(_) => StatusCode::NOT_FOUND,
            AfasError::NoSuchAnalyzer(_) => StatusCode::BAD_REQUEST,
            AfasError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AfasError::Conflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AfasError::DerivationFailed { .. }
            | AfasError::AnalyzerFailed { .. }
            | AfasError::AnalyzerMissingArtifact { .. }
            | AfasError::Timeout { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AfasError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for AfasError {
    fn into_response(self) -> Response {
        if matches!(self, AfasError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status();
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AfasError>;
