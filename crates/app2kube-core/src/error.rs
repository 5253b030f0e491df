//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or inconsistent application configuration
    #[error("{message}")]
    Config { message: String },

    /// Configuration that is well-formed but not allowed (e.g. staging with a wildcard host)
    #[error("{message}")]
    Validation { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed parsing {flag} data: {message}")]
    SetParse { flag: &'static str, message: String },

    #[error("Crypto error: {message}")]
    Crypto { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// True for errors caused by the user's configuration rather than the environment
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::Validation { .. }
                | Self::SetParse { .. }
                | Self::MissingField { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
