//! Logging subsystem errors

use thiserror::Error;

/// Errors raised while configuring the logging subsystem
#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("invalid logging configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoggingError::InitializationFailed("already set".to_string());
        assert_eq!(format!("{}", err), "failed to initialize logging: already set");
    }
}
