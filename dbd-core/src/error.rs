use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbdError {
    /// Malformed version string; rejected at descriptor-creation time.
    Version(String),
    /// Malformed typed parameter value, tagged with the item name.
    Config(String),
    /// Parameter bound or modify-limit violation.
    Validation(String),
    /// Script entry point could not be resolved or loaded.
    Script(String),
    Command(String),
    Internal(String),
    Io(#[from] std::io::Error),
    Serialization(String),
    Other(#[from] anyhow::Error),
}

impl Display for DbdError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DbdError::Version(s) => write!(f, "Invalid version: {}", s),
            DbdError::Config(s) => write!(f, "Configuration error: {}", s),
            DbdError::Validation(s) => write!(f, "Validation error: {}", s),
            DbdError::Script(s) => write!(f, "Script plugin error: {}", s),
            DbdError::Command(s) => write!(f, "Command failed: {}", s),
            DbdError::Internal(s) => write!(f, "Internal error: {}", s),
            DbdError::Io(e) => write!(f, "I/O error: {}", e),
            DbdError::Serialization(s) => write!(f, "Serialization error: {}", s),
            DbdError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl From<serde_yaml_ng::Error> for DbdError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DbdError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DbdError {
    fn from(err: serde_json::Error) -> Self {
        DbdError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbdError>;
