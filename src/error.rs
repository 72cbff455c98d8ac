//! Error types for the rainstream engine.

/// Top-level error type for session construction and frame ingestion.
#[derive(Debug, thiserror::Error)]
pub enum RainstreamError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid difficulty tag: {tag:?} (expected easy, medium or hard)")]
    InvalidDifficulty { tag: String },

    #[error("Frame {frame_index} arrived after frame {last_frame_index}")]
    FrameOrder {
        frame_index: u64,
        last_frame_index: u64,
    },

    #[error("Worker pool error: {message}")]
    WorkerPool { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RainstreamError.
pub type RainstreamResult<T> = Result<T, RainstreamError>;

impl RainstreamError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn worker_pool(msg: impl Into<String>) -> Self {
        Self::WorkerPool {
            message: msg.into(),
        }
    }
}
