use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeaveError {
    #[error("Invalid traceparent header: {0}")]
    InvalidTraceParent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sampling rate must be between 0.0 and 1.0, got {0}")]
    InvalidSamplingRate(f64),

    #[error("Export to {backend} failed: {message}")]
    Export { backend: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Shutdown failed for backends: {}", failed.join(", "))]
    Shutdown { failed: Vec<String> },
}

/// Result type alias for spanweave operations
pub type Result<T> = std::result::Result<T, WeaveError>;

impl WeaveError {
    /// Creates a new traceparent format error
    pub fn trace_parent<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTraceParent(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new export error for the named backend
    pub fn export<B: Into<String>, S: Into<String>>(backend: B, msg: S) -> Self {
        Self::Export {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Export { .. } | Self::Timeout { .. } => true,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidTraceParent(_) => "propagation",
            Self::Config(_) | Self::InvalidSamplingRate(_) => "config",
            Self::Export { .. } | Self::Http(_) => "export",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::Timeout { .. } => "timeout",
            Self::Shutdown { .. } => "lifecycle",
        }
    }
}
