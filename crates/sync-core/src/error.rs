use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for surfacing and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Authentication/authorization failure.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the server.
    RateLimited,
    /// Wire-protocol violation (bad frame, unknown discriminant).
    Protocol,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal engine bug or invariant break.
    Internal,
}

/// Stable engine error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct EngineError {
    /// High-level error category.
    pub category: EngineErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl EngineError {
    /// Construct a new engine error.
    pub fn new(
        category: EngineErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Map HTTP status codes to engine error categories.
pub fn classify_http_status(status: u16) -> EngineErrorCategory {
    match status {
        401 | 403 => EngineErrorCategory::Auth,
        408 | 429 => EngineErrorCategory::RateLimited,
        400..=499 => EngineErrorCategory::Config,
        500..=599 => EngineErrorCategory::Network,
        _ => EngineErrorCategory::Internal,
    }
}
