use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Unauthorized: {url}")]
    Unauthorized { url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{client} returned an error: {message}")]
    Protocol { client: String, message: String },

    #[error("Blocklist error: {0}")]
    Blocklist(String),

    #[error("Config {config} is locked by process {owner_pid} on {owner_host} for {locked_for:?}")]
    InstanceLocked {
        config: String,
        owner_pid: u32,
        owner_host: String,
        locked_for: Duration,
    },

    #[error("Failed to acquire lock: {message}")]
    LockError { message: String },

    #[error("Removal queue is closed")]
    QueueClosed,

    #[error("External service error: {0}")]
    External(String),
}

impl AppError {
    /// Whether a retry with backoff may succeed. Authorization failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_builder() && !e.is_redirect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
