use thiserror::Error;

/// Errors raised while setting up logging and configuration
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging setup error
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error result type
pub type Result<T> = std::result::Result<T, CommonError>;

impl From<figment::Error> for CommonError {
    fn from(err: figment::Error) -> Self {
        CommonError::Config(err.to_string())
    }
}
