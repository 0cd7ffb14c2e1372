//! Error types for the advisor swarm

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Stage Errors
    // =============================

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Malformed result: {0}")]
    MalformedResult(String),

    // =============================
    // Cascade Errors
    // =============================

    #[error("Orchestration fault: {0}")]
    OrchestrationFault(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    // =============================
    // Boundary Errors
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Failures of the stage's own work: the collaborator call or its result.
    /// Caller mistakes such as bad overrides are not attributed to a stage.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            OrchestrationError::InferenceError(_)
                | OrchestrationError::MalformedResult(_)
                | OrchestrationError::SerializationError(_)
                | OrchestrationError::HttpError(_)
        )
    }

    /// Invariant violations that abort the whole cascade
    pub fn is_fault(&self) -> bool {
        matches!(self, OrchestrationError::OrchestrationFault(_))
    }
}
