//! Error types for kbgate

use thiserror::Error;

/// Result type alias using KbgateError
pub type Result<T> = std::result::Result<T, KbgateError>;

/// Error type alias for convenience
pub type Error = KbgateError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const UPSTREAM_ERROR: i32 = 4;
}

/// Main error type for kbgate
#[derive(Debug, Error)]
pub enum KbgateError {
    #[error("Invalid API credentials for the completion service")]
    InvalidCredentials,

    #[error("Completion service rate limit exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Completion service error (HTTP {status}): {body}")]
    UpstreamServer { status: u16, body: String },

    #[error("Completion request rejected (HTTP {status}): {body}")]
    RequestRejected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl KbgateError {
    /// Whether the retry loop may attempt the request again.
    ///
    /// Everything else surfaces on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::UpstreamServer { .. }
                | Self::Network(_)
                | Self::Unknown(_)
        )
    }

    /// Build the error for a non-success upstream status.
    ///
    /// `attempts` is only reported by `RateLimited`.
    pub fn from_status(status: u16, body: String, attempts: u32) -> Self {
        match status {
            401 => Self::InvalidCredentials,
            429 => Self::RateLimited { attempts },
            s if s >= 500 => Self::UpstreamServer { status: s, body },
            s => Self::RequestRejected { status: s, body },
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotReady(_) => exit_codes::NOT_FOUND,
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            Self::InvalidCredentials
            | Self::RateLimited { .. }
            | Self::UpstreamServer { .. }
            | Self::RequestRejected { .. }
            | Self::Network(_)
            | Self::MalformedResponse(_) => exit_codes::UPSTREAM_ERROR,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}

impl From<reqwest::Error> for KbgateError {
    fn from(e: reqwest::Error) -> Self {
        // Payloads are parsed from raw bytes, so decode errors are transport failures
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
            Self::Network(e.to_string())
        } else {
            Self::Unknown(e.to_string())
        }
    }
}
