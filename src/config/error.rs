use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate download client name: {name}")]
    DuplicateClientName { name: String },

    #[error("Duplicate {instance_type} instance name: {name}")]
    DuplicateInstanceName { instance_type: String, name: String },

    #[error("{section}: '{field}' must not be empty")]
    MissingField { section: String, field: String },

    #[error("Blocklist for {instance_type} is enabled but has no path")]
    BlocklistPathMissing { instance_type: String },

    #[error("Seeding category '{name}' is invalid: {reason}")]
    InvalidSeedingCategory { name: String, reason: String },

    #[error("Unlinked cleanup is misconfigured: {reason}")]
    UnlinkedMisconfigured { reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
