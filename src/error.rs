//! Error types for the portfolio agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Upstream Failures (turn-fatal)
    // =============================

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The data source rejected a freshly issued session
    #[error("Authentication expired")]
    AuthExpired,

    #[error("Upstream returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Agent runtime error: {0}")]
    RuntimeError(String),

    #[error("Agent exceeded {0} iterations")]
    IterationLimit(u32),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

impl OrchestrationError {
    /// Failures that must abort the whole turn instead of being folded into a
    /// tool's error payload.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(
            self,
            OrchestrationError::RateLimited { .. } | OrchestrationError::AuthExpired
        )
    }
}
