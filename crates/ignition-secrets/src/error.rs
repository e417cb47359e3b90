use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Secret not found: {name} (expected file {path})")]
    NotFound { name: String, path: PathBuf },

    #[error("Secret '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("Invalid secret name: {name}")]
    InvalidName { name: String },

    #[error("Failed to read secret '{name}' from {path}: {source}")]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SecretsError {
    /// Name of the secret this error is about
    pub fn name(&self) -> &str {
        match self {
            SecretsError::NotFound { name, .. }
            | SecretsError::Malformed { name, .. }
            | SecretsError::InvalidName { name }
            | SecretsError::Io { name, .. } => name,
        }
    }
}

pub type Result<T> = std::result::Result<T, SecretsError>;
