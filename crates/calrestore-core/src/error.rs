use thiserror::Error;

/// Core-level errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),

    #[error("Dump version missing or unparseable: {0}")]
    VersionMissing(&'static str),

    #[error("Dump version already set to {0}")]
    VersionAlreadySet(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
