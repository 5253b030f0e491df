//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`], which decides the process
//! exit code and how the error is rendered.

use app2kube_core::CoreError;
use app2kube_engine::{EngineError, TemplateError};
use app2kube_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Missing or invalid configuration
    #[error("{message}")]
    #[diagnostic(code(app2kube::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Values template failed to render
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    /// Values could not be parsed
    #[error("{message}")]
    #[diagnostic(code(app2kube::cli::parse))]
    Parse { message: String },

    /// File or URL could not be read or written
    #[error("{message}")]
    #[diagnostic(code(app2kube::cli::io))]
    Io { message: String },

    /// The cluster rejected or failed a request
    #[error("{message}")]
    #[diagnostic(code(app2kube::cli::cluster))]
    Cluster { message: String },

    /// A rollout did not become ready in time
    #[error("{message}")]
    #[diagnostic(
        code(app2kube::cli::timeout),
        help("the previous color keeps serving traffic; inspect the rollout and re-run")
    )]
    Timeout { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(app2kube::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Template(_) | CliError::Parse { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Timeout { .. } => exit_codes::TIMEOUT_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Io(_) => CliError::Io { message },
            CoreError::YamlParse(_) | CoreError::JsonParse(_) => CliError::Parse { message },
            CoreError::Crypto { .. } => CliError::Other { message },
            _ if err.is_config() => CliError::config(message),
            _ => CliError::Other { message },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(e) => CliError::Template(e),
            EngineError::Core(e) => e.into(),
            EngineError::Parse { .. } => CliError::Parse {
                message: err.to_string(),
            },
            EngineError::ReadSource { .. } | EngineError::Network { .. } | EngineError::Io(_) => {
                CliError::io(err.to_string())
            }
            EngineError::Yaml(_) | EngineError::Json(_) => CliError::Other {
                message: err.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Engine(e) => e.into(),
            KubeError::Timeout { .. } => CliError::Timeout {
                message: err.to_string(),
            },
            KubeError::InvalidConfig(message) => CliError::config(message),
            KubeError::Io(e) => CliError::io(e.to_string()),
            other => CliError::Cluster {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::io(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
