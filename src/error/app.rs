use thiserror::Error;

use super::{CommunicationError, ConfigError, ValidationError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("CLI error: {source}")]
    Clap {
        #[from]
        source: clap::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Communication error: {0}")]
    Communication(#[from] CommunicationError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation<E>(error: E) -> Self
    where
        E: Into<ValidationError>,
    {
        error.into().into()
    }

    pub fn config<E>(error: E) -> Self
    where
        E: Into<ConfigError>,
    {
        error.into().into()
    }

    pub fn communication<E>(error: E) -> Self
    where
        E: Into<CommunicationError>,
    {
        error.into().into()
    }

    /// Startup failures are reported with a distinct exit status from
    /// runtime failures. These cover bad configuration, a missing script,
    /// an unbindable listener and an unreachable console.
    #[must_use]
    pub const fn is_initialisation(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Validation(_)
                | AppError::Clap { .. }
                | AppError::Communication(
                    CommunicationError::Bind { .. } | CommunicationError::Connection { .. }
                )
        )
    }
}
