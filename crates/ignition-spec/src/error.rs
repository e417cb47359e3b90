//! Error types for the spec crate

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::template::TemplateError;

/// Errors that can occur when parsing or validating a spec
#[derive(Debug, Error)]
pub enum SpecError {
    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO error when reading spec file
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Validation errors for bootstrap specs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The kind of validation error
    pub kind: ValidationErrorKind,

    /// Path to the invalid field (e.g. `depends[0].probe.port`)
    pub path: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// The specific kind of validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Version is not "v1"
    InvalidVersion { found: String },

    /// Service name has invalid characters
    InvalidServiceName { name: String },

    /// Secret name is not a single plain file name
    InvalidSecretName { name: String },

    /// Secret listed twice
    DuplicateSecret { name: String },

    /// Config key is not a valid environment variable name
    InvalidConfigKey { key: String },

    /// Dependency listed twice
    DuplicateDependency { name: String },

    /// Probe parameters are unusable
    InvalidProbe { reason: String },

    /// Init step id used twice
    DuplicateStep { id: String },

    /// A template could not be parsed
    InvalidTemplate { reason: String },

    /// A template references a secret that is not declared
    UndeclaredSecret { name: String },

    /// A template references a config key that is not declared
    UndeclaredConfig { key: String },

    /// Secret references are not allowed here
    SecretNotAllowed { name: String },

    /// Mode string is not an octal permission value
    InvalidMode { value: String },

    /// Environment variable name is invalid
    InvalidEnvName { name: String },

    /// Generic error from the validator crate
    Generic { message: String },
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion { found } => {
                write!(f, "version must be 'v1', found '{}'", found)
            }
            Self::InvalidServiceName { name } => write!(
                f,
                "service name '{}' must be alphanumeric with '-' or '_'",
                name
            ),
            Self::InvalidSecretName { name } => {
                write!(f, "secret name '{}' must be a plain file name", name)
            }
            Self::DuplicateSecret { name } => write!(f, "secret '{}' listed twice", name),
            Self::InvalidConfigKey { key } => {
                write!(f, "config key '{}' is not a valid variable name", key)
            }
            Self::DuplicateDependency { name } => {
                write!(f, "dependency '{}' listed twice", name)
            }
            Self::InvalidProbe { reason } => write!(f, "invalid probe: {}", reason),
            Self::DuplicateStep { id } => write!(f, "init step id '{}' used twice", id),
            Self::InvalidTemplate { reason } => write!(f, "invalid template: {}", reason),
            Self::UndeclaredSecret { name } => write!(
                f,
                "secret '{}' is referenced but not listed in secrets.names",
                name
            ),
            Self::UndeclaredConfig { key } => write!(
                f,
                "config key '{}' is referenced but not listed in config.required or config.defaults",
                key
            ),
            Self::SecretNotAllowed { name } => write!(
                f,
                "secret '{}' cannot be passed to the launched daemon's environment",
                name
            ),
            Self::InvalidMode { value } => write!(f, "'{}' is not an octal mode", value),
            Self::InvalidEnvName { name } => {
                write!(f, "'{}' is not a valid environment variable name", name)
            }
            Self::Generic { message } => f.write_str(message),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.path, self.kind)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<TemplateError> for ValidationErrorKind {
    fn from(err: TemplateError) -> Self {
        ValidationErrorKind::InvalidTemplate {
            reason: err.to_string(),
        }
    }
}
