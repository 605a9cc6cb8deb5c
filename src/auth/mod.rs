//! Credentials, the credential pool, and the credential source
//!
//! Every credential is owned by exactly one [`CredentialPool`]; the pool is
//! the only writer of quota state and the only place credentials change state.

pub mod credential;
pub mod pool;
pub mod source;

pub use credential::{mask_secret, Credential, CredentialId, CredentialState, QuotaSnapshot};
pub use pool::{CredentialError, CredentialPool, CredentialReport};
pub use source::{load_credentials, parse_credential_lines};
