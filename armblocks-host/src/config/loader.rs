//! Configuration loading
//!
//! Reads the robot description from a TOML file and validates it before
//! anything touches the bus.

use std::fmt;
use std::fs;
use std::path::Path;

use armblocks_core::config::{self as core_config, ArmConfig};
use log::{debug, info, warn};

/// Configuration loading errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read
    Io,
    /// TOML parsing failed
    TomlParse,
    /// Parsed but inconsistent
    Invalid(core_config::ConfigError),
}

impl From<core_config::ConfigError> for ConfigError {
    fn from(e: core_config::ConfigError) -> Self {
        ConfigError::Invalid(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io => write!(f, "cannot read configuration"),
            ConfigError::TomlParse => write!(f, "configuration is not valid TOML"),
            ConfigError::Invalid(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

/// Load and validate a configuration file
pub fn load(path: &Path) -> Result<ArmConfig, ConfigError> {
    info!("Loading configuration from {}", path.display());

    let text = fs::read_to_string(path).map_err(|e| {
        warn!("Cannot read {}: {}", path.display(), e);
        ConfigError::Io
    })?;
    debug!("Read {} bytes of TOML", text.len());

    let config = parse(&text)?;
    log_config_summary(&config);
    Ok(config)
}

/// Parse and validate configuration text
pub fn parse(text: &str) -> Result<ArmConfig, ConfigError> {
    let config: ArmConfig = toml::from_str(text).map_err(|e| {
        warn!("TOML parse error: {}", e);
        ConfigError::TomlParse
    })?;
    config.validate()?;
    Ok(config)
}

/// Log a summary of the loaded configuration
fn log_config_summary(config: &ArmConfig) {
    info!("Configuration loaded successfully");
    debug!("  {} joints", config.joints.len());
    for joint in &config.joints {
        debug!(
            "    {} -> servo {} ({:?})",
            joint.name.as_str(),
            joint.servo_id,
            joint.kind
        );
    }
    match &config.arm.gripper {
        Some(name) => debug!("  gripper: {}", name.as_str()),
        None => debug!("  no gripper"),
    }
    debug!("  settle {} ms, frame {} ms", config.arm.settle_ms, config.arm.frame_ms);
}
