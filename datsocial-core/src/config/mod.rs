//! Configuration management
//!
//! Environment- and file-based configuration with defaults and validation.
//! Environment variables follow the pattern `DATSOCIAL_<SECTION>_<KEY>`,
//! e.g. `DATSOCIAL_DAT_SWARM_DIR=/var/lib/datsocial/swarm`.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::core_identity::MIN_KEY_BITS;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity key generation
    pub identity: IdentityConfig,

    /// Dat replication and lookup
    pub dat: DatConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Identity key generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Requested key strength in bits; must be at least [`MIN_KEY_BITS`]
    pub num_bits: u32,
}

/// Dat replication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatConfig {
    /// Directory where dats are announced for peers to find.
    /// Peers that should reach each other must share this directory.
    pub swarm_dir: PathBuf,

    /// Total time `load` waits for a dat to become reachable
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,

    /// Delay between lookup retries while waiting
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit JSON-structured lines
    pub json_format: bool,

    /// Include the target module in output
    pub with_target: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            dat: DatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { num_bits: 512 }
    }
}

impl Default for DatConfig {
    fn default() -> Self {
        Self {
            swarm_dir: PathBuf::from("./swarm"),
            load_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(bits) = env::var("DATSOCIAL_IDENTITY_NUM_BITS") {
            config.identity.num_bits = bits
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid num_bits: {}", e)))?;
        }

        if let Ok(dir) = env::var("DATSOCIAL_DAT_SWARM_DIR") {
            config.dat.swarm_dir = PathBuf::from(dir);
        }
        if let Ok(timeout) = env::var("DATSOCIAL_DAT_LOAD_TIMEOUT") {
            config.dat.load_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidValue(format!("invalid load_timeout: {}", e)))?;
        }
        if let Ok(backoff) = env::var("DATSOCIAL_DAT_RETRY_BACKOFF") {
            config.dat.retry_backoff = humantime::parse_duration(&backoff)
                .map_err(|e| ConfigError::InvalidValue(format!("invalid retry_backoff: {}", e)))?;
        }

        if let Ok(level) = env::var("DATSOCIAL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("DATSOCIAL_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.num_bits < MIN_KEY_BITS {
            return Err(ConfigError::ValidationFailed(format!(
                "num_bits must be at least {}",
                MIN_KEY_BITS
            )));
        }

        if self.dat.load_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "load_timeout must be greater than zero".to_string(),
            ));
        }

        if self.dat.retry_backoff > self.dat.load_timeout {
            return Err(ConfigError::ValidationFailed(
                "retry_backoff must not exceed load_timeout".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }
}
