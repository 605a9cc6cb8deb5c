//! Search engine: partitioning, rate governance, execution, orchestration

pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod partition;
pub mod rate_limit;
pub mod store;

use crate::auth::CredentialError;
use crate::output::OutputError;

pub use config::{ConfigError, DelaySpec, EngineConfig};
pub use executor::{ExecutorError, ExecutorOutcome, SearchExecutor, WindowReport};
pub use orchestrator::{
    CompletenessWarning, FailedWindow, IncompleteReason, LeafWindow, Orchestrator, RunSummary,
};
pub use partition::{WindowArena, WindowId, WindowPartitioner, WindowStatus};
pub use rate_limit::{PostResponseDecision, PreRequestDecision, RateGovernor};
pub use store::ResultStore;

/// Errors that end a search run
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No credential can ever be used again
    #[error("credentials exhausted: {0}")]
    CredentialsExhausted(#[source] CredentialError),

    /// The pool holds no credentials
    #[error("no credentials available")]
    NoCredentials,

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The sink failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Nothing to search
    #[error("no search kinds selected")]
    NoKinds,
}
