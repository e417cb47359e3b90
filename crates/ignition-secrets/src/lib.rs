//! Ignition secrets
//!
//! Loads credentials mounted as files (Docker/Compose secrets) into redacted,
//! zeroizing wrappers. Secrets are read once at startup and never logged.

mod error;
mod provider;
mod types;

pub use error::{Result, SecretsError};
pub use provider::{FileSecretStore, SecretsProvider};
pub use types::{Secret, SecretSet};
