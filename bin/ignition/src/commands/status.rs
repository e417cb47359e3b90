use anyhow::Result;
use ignition_agent::BootstrapGuard;
use std::path::Path;

use super::load_spec;

/// Report whether the marker exists. Exits 0 when initialized, 1 otherwise.
pub(crate) fn status(spec_path: &Path) -> Result<i32> {
    let spec = load_spec(spec_path)?;
    let guard = BootstrapGuard::new(&spec.marker.path);

    if guard.is_initialized()? {
        println!("{}: initialized ({})", spec.service, guard.marker().display());
        Ok(0)
    } else {
        println!("{}: not initialized ({} absent)", spec.service, guard.marker().display());
        Ok(1)
    }
}
