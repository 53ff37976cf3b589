//! Engine error taxonomy.
//!
//! Every failure the engine surfaces to a caller is one of these variants,
//! each with a stable snake_case wire code. Adapters (store, providers)
//! propagate `anyhow::Error` internally; the engine boundary converts into
//! this taxonomy so callers can distinguish "no data" from a backend outage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Ingestion input had no usable text after normalization.
    #[error("no usable text content after normalization")]
    EmptyContent,

    /// A lookup by id missed.
    #[error("not found: {0}")]
    NotFound(String),

    /// `start_recording` while a session is already active.
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// `stop_recording` (or cancel) without an active session.
    #[error("no recording session is active")]
    NotRecording,

    /// The audio capture collaborator failed to start or finish a session.
    #[error("audio capture failed: {0}")]
    CaptureFailed(String),

    /// The embedding backend could not be invoked or returned a failure.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingBackendUnavailable(String),

    /// The generation backend could not be invoked or returned a failure.
    #[error("generation backend unavailable: {0}")]
    GenerationBackendUnavailable(String),

    /// The transcription backend failed on captured audio.
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Store-layer failure. Fatal to the in-flight operation; the
    /// transaction it was part of has been rolled back.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code, used in HTTP responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::EmptyContent => "empty_content",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyRecording => "already_recording",
            EngineError::NotRecording => "not_recording",
            EngineError::CaptureFailed(_) => "capture_failed",
            EngineError::EmbeddingBackendUnavailable(_) => "embedding_backend_unavailable",
            EngineError::GenerationBackendUnavailable(_) => "generation_backend_unavailable",
            EngineError::TranscriptionFailed(_) => "transcription_failed",
            EngineError::Store(_) => "store_error",
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound(id.into())
    }

    pub fn embedding_unavailable(err: impl std::fmt::Display) -> Self {
        EngineError::EmbeddingBackendUnavailable(err.to_string())
    }

    pub fn generation_unavailable(err: impl std::fmt::Display) -> Self {
        EngineError::GenerationBackendUnavailable(err.to_string())
    }

    pub fn transcription_failed(err: impl std::fmt::Display) -> Self {
        EngineError::TranscriptionFailed(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::EmptyContent.code(), "empty_content");
        assert_eq!(EngineError::AlreadyRecording.code(), "already_recording");
        assert_eq!(EngineError::NotRecording.code(), "not_recording");
        assert_eq!(
            EngineError::embedding_unavailable("down").code(),
            "embedding_backend_unavailable"
        );
        assert_eq!(
            EngineError::generation_unavailable("down").code(),
            "generation_backend_unavailable"
        );
        assert_eq!(
            EngineError::transcription_failed("bad audio").code(),
            "transcription_failed"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = EngineError::not_found("doc-42");
        assert_eq!(err.to_string(), "not found: doc-42");

        let err = EngineError::embedding_unavailable("connection refused");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn store_errors_wrap_anyhow() {
        let err: EngineError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.code(), "store_error");
        assert!(err.to_string().contains("disk full"));
    }
}
