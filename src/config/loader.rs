//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GateConfig;
use crate::config::validation::validate_config;
use crate::config::ConfigError;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    validated(read_config(path)?)
}

/// Read configuration without validating it, so callers can apply
/// overrides first.
pub fn read_config(path: &Path) -> Result<GateConfig, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

fn parse_config(content: &str) -> Result<GateConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

fn validated(config: GateConfig) -> Result<GateConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
