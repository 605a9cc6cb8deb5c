//! Credential quota check command

use crate::auth::mask_secret;
use crate::fetcher::github_http::GitHubClient;
use clap::Args;
use serde_json::json;
use tracing::warn;

use super::{Cli, CliError};

/// Tokens command arguments
#[derive(Args, Debug)]
pub struct TokensArgs {
    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl TokensArgs {
    /// Query `/rate_limit` for every credential and print its search quota.
    ///
    /// The rate-limit endpoint does not spend search quota.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.engine_config()?;
        let secrets = cli.credentials()?;
        let client = GitHubClient::new(&config)?;

        let mut rows = Vec::with_capacity(secrets.len());
        for secret in &secrets {
            let masked = mask_secret(secret);
            match client.search_quota(secret).await {
                Ok(status) => rows.push(json!({
                    "credential": masked,
                    "valid": status.valid,
                    "remaining": status.remaining,
                    "limit": status.limit,
                    "reset_at": status.reset_at.map(|t| t.to_rfc3339()),
                })),
                Err(e) => {
                    warn!(credential = %masked, error = %e, "Quota check failed");
                    rows.push(json!({
                        "credential": masked,
                        "valid": null,
                        "error": e.to_string(),
                    }));
                }
            }
        }

        if self.json {
            let text = serde_json::to_string_pretty(&rows)
                .map_err(|e| CliError::InvalidArgument(format!("Failed to serialize: {e}")))?;
            println!("{text}");
            return Ok(());
        }

        println!("{} credential(s):\n", rows.len());
        for row in &rows {
            let credential = row["credential"].as_str().unwrap_or_default();
            match row["valid"].as_bool() {
                Some(true) => println!(
                    "{credential} | valid | search {}/{} | resets {}",
                    row["remaining"],
                    row["limit"],
                    row["reset_at"].as_str().unwrap_or("unknown")
                ),
                Some(false) => println!("{credential} | INVALID"),
                None => println!(
                    "{credential} | error: {}",
                    row["error"].as_str().unwrap_or_default()
                ),
            }
        }
        Ok(())
    }
}
