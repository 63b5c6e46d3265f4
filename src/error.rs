/// Centralized error types for githarvest using thiserror
///
/// Provides domain-specific error types so poll cycles can log precise,
/// repository-scoped failures without crashing the process.
use thiserror::Error;

/// Main error type for the harvester
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Watermark store error: {0}")]
    Watermark(#[from] WatermarkError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

/// Errors from the watermark key-value store
#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("Failed to construct watermark store client: {0}")]
    Client(String),

    #[error("Watermark store unreachable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("Watermark store returned status {0}")]
    UnexpectedStatus(u16),

    #[error("Stored watermark is not a valid RFC 3339 timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("Failed to write watermark for '{repo}': {reason}")]
    WriteFailed { repo: String, reason: String },
}

/// Errors from the upstream commit source
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to construct upstream client: {0}")]
    Client(String),

    #[error("Fetch timed out after {0} seconds")]
    Timeout(u64),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

/// Errors from the append-only log backends
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to construct storage client: {0}")]
    Client(String),

    #[error("Failed to read log '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to append to log '{path}': {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Errors from settings validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl HarvestError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        HarvestError::Other(msg.into())
    }

    /// Whether the failed step left the watermark behind the log.
    ///
    /// True only for a watermark commit that failed after a successful
    /// append; the next cycle re-fetches the same window (at-least-once).
    pub fn is_post_append(&self) -> bool {
        matches!(
            self,
            HarvestError::Watermark(WatermarkError::WriteFailed { .. })
        )
    }
}
