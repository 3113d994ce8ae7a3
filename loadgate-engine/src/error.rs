//! Error types for load runs
//!
//! Only setup and configuration problems are errors. Failed iterations are
//! recorded as samples and breached thresholds are part of the verdict.

use loadgate_config::ConfigError;
use loadgate_http::HttpError;
use thiserror::Error;

/// Run-halting errors
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Setup failed: {0}")]
    Setup(#[from] SetupFailure),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] HttpError),
}

/// Why the target pool could not be acquired
#[derive(Error, Debug)]
pub enum SetupFailure {
    #[error("definitions endpoint unreachable: {0}")]
    Unreachable(HttpError),

    #[error("definitions endpoint returned status {0}")]
    UnexpectedStatus(u16),

    #[error("definitions endpoint returned a malformed body: {0}")]
    MalformedBody(String),

    #[error("target pool is empty")]
    EmptyTargetPool,
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
