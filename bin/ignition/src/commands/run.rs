use anyhow::{Context, Result};
use ignition_agent::Bootstrapper;
use ignition_spec::LaunchMode;
use std::path::{Path, PathBuf};
use tracing::info;

use super::load_spec;

/// Bootstrap the service described by `spec_path` and hand off to it
pub(crate) async fn run(spec_path: &Path, secrets_dir: Option<PathBuf>, supervise: bool) -> Result<i32> {
    let mut spec = load_spec(spec_path)?;
    if let Some(dir) = secrets_dir {
        spec.secrets.dir = dir;
    }
    if supervise {
        spec.launch.mode = LaunchMode::Supervise;
    }

    info!(
        service = %spec.service,
        spec = %spec_path.display(),
        mode = ?spec.launch.mode,
        "Starting bootstrap"
    );

    let service = spec.service.clone();
    Bootstrapper::new(spec)
        .run()
        .await
        .with_context(|| format!("Bootstrap of '{}' failed", service))
}
