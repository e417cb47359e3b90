pub mod check;
pub mod run;
pub mod status;
pub mod validate;

use anyhow::{Context, Result};
use ignition_spec::BootstrapSpec;
use std::path::Path;

/// Load and validate a spec file
pub(crate) fn load_spec(path: &Path) -> Result<BootstrapSpec> {
    ignition_spec::from_yaml_file(path)
        .with_context(|| format!("Failed to load spec {}", path.display()))
}
