//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    FileRead(String),

    #[error("failed to write configuration file: {0}")]
    FileWrite(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}
