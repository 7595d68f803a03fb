//! Error types for Herald operations

use thiserror::Error;

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Failed to serialize cached value: {reason}")]
    Serialization { reason: String },

    #[error("Failed to deserialize cached value: {reason}")]
    Deserialization { reason: String },

    #[error("Malformed cache key: {reason}")]
    KeyDecode { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Herald errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeraldError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Herald operations.
pub type HeraldResult<T> = Result<T, HeraldError>;
