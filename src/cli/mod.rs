//! CLI command implementations

pub mod error;
pub mod search;
pub mod tokens;

pub use error::CliError;
pub use search::SearchArgs;
pub use tokens::TokensArgs;

use crate::auth::{load_credentials, CredentialError};
use crate::engine::EngineConfig;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default credential location
pub const DEFAULT_TOKEN_PATH: &str = "config/tokens";

/// Slicehound CLI
#[derive(Parser, Debug)]
#[command(name = "slicehound")]
#[command(
    about = "Find every repository, code file and gist matching a term, past the 1000-result search cap",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Engine configuration file (TOML); flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Credential file, or directory whose *.txt files hold one token per line
    #[arg(long = "token-file", global = true, default_value = DEFAULT_TOKEN_PATH)]
    pub token_file: PathBuf,

    /// Token to use ahead of the token file (repeatable)
    #[arg(short = 't', long = "token", global = true)]
    pub tokens: Vec<String>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a term across a date range
    Search(SearchArgs),

    /// Show the search quota of every credential
    Tokens(TokensArgs),
}

impl Cli {
    /// Engine configuration from `--config`, or defaults.
    pub fn engine_config(&self) -> Result<EngineConfig, CliError> {
        match &self.config {
            Some(path) => {
                info!(path = %path.display(), "Loading engine configuration");
                Ok(EngineConfig::from_toml_file(path)?)
            }
            None => Ok(EngineConfig::default()),
        }
    }

    /// Inline tokens followed by the token file's, duplicates removed.
    pub fn credentials(&self) -> Result<Vec<String>, CliError> {
        collect_credentials(&self.tokens, &self.token_file)
    }
}

/// Merge inline secrets with those from `path`, keeping first occurrences.
///
/// A missing `path` is only an error when no inline secrets were given.
pub fn collect_credentials(inline: &[String], path: &Path) -> Result<Vec<String>, CliError> {
    let mut secrets: Vec<String> = inline
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if path.exists() {
        secrets.extend(load_credentials(path)?);
    } else if secrets.is_empty() {
        return Err(CredentialError::Source {
            path: path.display().to_string(),
            message: "not found; pass --token or --token-file".to_string(),
        }
        .into());
    } else {
        debug!(path = %path.display(), "Token file not found, using inline tokens only");
    }

    let mut seen = HashSet::new();
    secrets.retain(|s| seen.insert(s.clone()));

    if secrets.is_empty() {
        return Err(CredentialError::NoCredentials.into());
    }
    Ok(secrets)
}
