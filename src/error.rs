use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Invalid recovery request: {0}")]
    InvalidRequest(String),

    #[error("Circuit open for artifact: {artifact_id}")]
    CircuitOpen { artifact_id: String },

    #[error("Stage '{stage}' timed out after {elapsed_ms}ms")]
    StageTimeout { stage: String, elapsed_ms: u64 },

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Fallback service error: {0}")]
    Fallback(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid render transition: {from} -> {event}")]
    InvalidRenderTransition { from: String, event: String },

    #[error("Retry budget exhausted for component '{component_id}' after {max_retries} retries")]
    RetryBudgetExhausted {
        component_id: String,
        max_retries: u32,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
