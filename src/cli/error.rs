//! CLI error types and conversions

use crate::auth::CredentialError;
use crate::engine::{ConfigError, EngineError};
use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::WindowError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Engine configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Credential loading error
    #[error("credential error: {0}")]
    CredentialError(#[from] CredentialError),

    /// Search run error
    #[error("search error: {0}")]
    EngineError(#[from] EngineError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Date range error
    #[error("invalid date range: {0}")]
    WindowError(#[from] WindowError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
