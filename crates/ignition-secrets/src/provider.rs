//! Secrets provider trait and the file-mount implementation
//!
//! - [`SecretsProvider`]: read-only access to named secrets
//! - [`FileSecretStore`]: one file per secret under a mount directory

use async_trait::async_trait;
use ignition_spec::is_valid_secret_name;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::{Result, Secret, SecretSet, SecretsError};

/// Read-only secrets provider.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Retrieve a single secret by name.
    ///
    /// # Errors
    ///
    /// Returns `SecretsError::NotFound` if the secret doesn't exist. Missing
    /// secrets are provisioned out-of-band, so callers must not retry.
    async fn get_secret(&self, name: &str) -> Result<Secret>;

    /// Check if a secret exists without reading it.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Load every named secret, stopping at the first failure.
    async fn load_all(&self, names: &[String]) -> Result<SecretSet> {
        let mut set = SecretSet::new();
        for name in names {
            set.insert(self.get_secret(name).await?);
        }
        Ok(set)
    }
}

/// Secrets mounted as plain files, e.g. `/run/secrets/db_password`.
///
/// File content is used verbatim as bytes: nothing is trimmed or decoded. A
/// value containing a newline, carriage return or NUL is rejected instead of
/// being silently cut, since it would break the line-oriented tools it is
/// passed to.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `name`
    pub fn secret_path(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_secret_name(name) {
            return Err(SecretsError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(name))
    }
}

fn check_content(name: &str, bytes: &[u8]) -> Result<()> {
    if let Some(pos) = bytes.iter().position(|b| matches!(b, b'\n' | b'\r' | 0)) {
        let reason = if pos + 1 == bytes.len() && bytes[pos] == b'\n' {
            "trailing newline (write the file with printf, not echo)".to_string()
        } else {
            format!("record separator at byte {}", pos)
        };
        return Err(SecretsError::Malformed {
            name: name.to_string(),
            reason,
        });
    }

    Ok(())
}

#[async_trait]
impl SecretsProvider for FileSecretStore {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn get_secret(&self, name: &str) -> Result<Secret> {
        let path = self.secret_path(name)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretsError::NotFound {
                    name: name.to_string(),
                    path,
                });
            }
            Err(source) => {
                return Err(SecretsError::Io {
                    name: name.to_string(),
                    path,
                    source,
                });
            }
        };

        check_content(name, &bytes)?;
        tracing::info!(secret = %name, bytes = bytes.len(), "Secret loaded");

        Ok(Secret::new(name, path, bytes))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.secret_path(name)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }
}
