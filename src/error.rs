// Error types for version-hunter
// Transport failures are recovered per probe; state failures fall back to empty state

use thiserror::Error;

/// Failure while setting up a hunter
#[derive(Error, Debug)]
pub enum HunterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure while issuing a single probe
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Connection refused by {0}")]
    Refused(String),
}

/// Failure while parsing a raw HTTP message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Empty message")]
    Empty,

    #[error("Malformed request line: {0}")]
    RequestLine(String),

    #[error("Malformed status line: {0}")]
    StatusLine(String),

    #[error("Malformed header line: {0}")]
    Header(String),
}

/// Failure while encoding or restoring persisted state
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invalid state JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported state schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Invalid record #{index} for host {host}: {reason}")]
    InvalidRecord {
        host: String,
        index: usize,
        reason: String,
    },

    #[error("Storage failure: {0}")]
    Storage(#[from] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value: {field} - {reason}")]
    Invalid { field: String, reason: String },
}
