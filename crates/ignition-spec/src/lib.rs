//! Ignition bootstrap spec
//!
//! This crate provides types for parsing and validating per-service
//! bootstrap specs.

mod error;
mod template;
mod types;
mod validate;

pub use error::*;
pub use template::*;
pub use types::*;
pub use validate::*;

use std::path::Path;
use validator::Validate;

/// Parse a bootstrap spec from YAML string
pub fn from_yaml_str(yaml: &str) -> Result<BootstrapSpec, SpecError> {
    let spec: BootstrapSpec = serde_yaml::from_str(yaml)?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Parse a bootstrap spec from YAML file
pub fn from_yaml_file(path: &Path) -> Result<BootstrapSpec, SpecError> {
    let content = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_yaml_str(&content)
}

/// Run field-level and cross-field validation on an already parsed spec
pub fn validate_spec(spec: &BootstrapSpec) -> Result<(), ValidationError> {
    validate_version(&spec.version)?;

    spec.validate().map_err(|e| {
        ValidationError::new(
            ValidationErrorKind::Generic {
                message: e.to_string(),
            },
            "",
        )
    })?;

    validate_service_name(&spec.service)?;
    validate_secrets(spec)?;
    validate_config_keys(spec)?;
    validate_dependencies(spec)?;
    validate_templates(spec)?;
    validate_fixups(spec)?;

    Ok(())
}
