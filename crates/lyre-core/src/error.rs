//! Error types for lyre-core

/// A synthesizer or key-injection call failed
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Synthesizer output error: {0}")]
    Synthesizer(String),

    #[error("Key injection error for key '{key}': {reason}")]
    KeyInjection { key: String, reason: String },

    #[error("Output device unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the layout table
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Unknown key layout: {0}")]
    UnknownLayout(String),

    #[error("Key layout '{0}' has no keys")]
    EmptyLayout(String),

    #[error("Failed to read layout file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse layout file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Errors talking to the engine task
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine task has shut down")]
    Disconnected,

    #[error("Engine did not acknowledge the request")]
    NoAcknowledgement,
}
