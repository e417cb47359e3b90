//! Agent errors
//!
//! Every variant is fatal to the bootstrap: the binary prints the message
//! and exits with [`AgentError::exit_code`].

use ignition_secrets::SecretsError;
use ignition_spec::TemplateError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// A declared secret could not be loaded
    #[error("Missing secret '{name}': {source}")]
    MissingSecret {
        name: String,
        #[source]
        source: SecretsError,
    },

    /// A required config key is unset or empty
    #[error("Missing config '{key}': required value is unset or empty")]
    MissingConfig { key: String },

    /// A config value is present but unusable
    #[error("Invalid config '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A dependency never became ready
    #[error("Dependency timeout: '{service}' waiting for '{dependency}' ({target}) gave up after {attempts} attempts, {interval:?} apart")]
    DependencyTimeout {
        service: String,
        dependency: String,
        target: String,
        attempts: u32,
        interval: Duration,
    },

    /// Init step failed
    #[error("Init failed for '{service}' at step '{step}': {reason}")]
    InitFailed {
        service: String,
        step: String,
        reason: String,
    },

    /// The marker's presence could not be determined
    #[error("Cannot check bootstrap marker {path}: {reason}")]
    MarkerUnreadable { path: PathBuf, reason: String },

    /// Permission/ownership repair failed
    #[error("Fix-up failed for {path}: {reason}")]
    FixupFailed { path: PathBuf, reason: String },

    /// The daemon could not be started
    #[error("Failed to launch '{program}': {reason}")]
    LaunchFailed {
        program: String,
        reason: String,
        not_found: bool,
    },

    /// Template rendering failed
    #[error("Template error in {context}: {source}")]
    Template {
        context: String,
        #[source]
        source: TemplateError,
    },

    /// Invalid spec
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// Internal runtime error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// `EX_CONFIG` from sysexits.h
pub const EXIT_CONFIG: i32 = 78;
/// `EX_UNAVAILABLE`
pub const EXIT_UNAVAILABLE: i32 = 69;
/// `EX_SOFTWARE`
pub const EXIT_SOFTWARE: i32 = 70;
/// `EX_CANTCREAT`
pub const EXIT_CANTCREAT: i32 = 73;
/// Command found but not executable
pub const EXIT_CANNOT_EXECUTE: i32 = 126;
/// Command not found
pub const EXIT_NOT_FOUND: i32 = 127;

impl AgentError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::MissingSecret { .. }
            | AgentError::MissingConfig { .. }
            | AgentError::InvalidConfig { .. }
            | AgentError::Template { .. }
            | AgentError::InvalidSpec(_) => EXIT_CONFIG,
            AgentError::DependencyTimeout { .. } => EXIT_UNAVAILABLE,
            AgentError::InitFailed { .. }
            | AgentError::MarkerUnreadable { .. }
            | AgentError::Internal(_) => EXIT_SOFTWARE,
            AgentError::FixupFailed { .. } => EXIT_CANTCREAT,
            AgentError::LaunchFailed { not_found, .. } => {
                if *not_found {
                    EXIT_NOT_FOUND
                } else {
                    EXIT_CANNOT_EXECUTE
                }
            }
        }
    }
}

impl From<SecretsError> for AgentError {
    fn from(err: SecretsError) -> Self {
        AgentError::MissingSecret {
            name: err.name().to_string(),
            source: err,
        }
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            AgentError::MissingConfig {
                key: "DOMAIN_NAME".into()
            }
            .exit_code(),
            EXIT_CONFIG
        );
        assert_eq!(
            AgentError::DependencyTimeout {
                service: "wordpress".into(),
                dependency: "mariadb".into(),
                target: "mariadb:3306".into(),
                attempts: 3,
                interval: Duration::from_secs(1),
            }
            .exit_code(),
            EXIT_UNAVAILABLE
        );
        assert_eq!(
            AgentError::LaunchFailed {
                program: "nginx".into(),
                reason: "No such file or directory".into(),
                not_found: true,
            }
            .exit_code(),
            EXIT_NOT_FOUND
        );
    }

    #[test]
    fn test_secret_error_conversion() {
        let err: AgentError = SecretsError::InvalidName {
            name: "../x".into(),
        }
        .into();
        match &err {
            AgentError::MissingSecret { name, .. } => assert_eq!(name, "../x"),
            other => panic!("Expected MissingSecret, got {:?}", other),
        }
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }
}
