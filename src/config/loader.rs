//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: GuardConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load configuration, degrading to pass-through defaults on any failure.
///
/// Bad configuration must never take the host process down: a missing file
/// yields full defaults, a malformed one yields a disabled guard. Either way
/// the reason is logged and request handling proceeds.
pub fn load_config_or_default(path: &Path) -> GuardConfig {
    if !path.exists() {
        tracing::warn!(path = ?path, "Config file not found, using defaults");
        return GuardConfig::default();
    }
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to load config, guard disabled");
            GuardConfig::passthrough()
        }
    }
}
