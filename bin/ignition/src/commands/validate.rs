use anyhow::Result;
use std::path::Path;

use super::load_spec;

/// Parse and validate a spec, printing a short summary
pub(crate) fn validate(spec_path: &Path) -> Result<i32> {
    let spec = load_spec(spec_path)?;

    println!("Spec is valid: {}", spec_path.display());
    println!("  Service:      {}", spec.service);
    println!("  Secrets:      {}", spec.secrets.names.len());
    println!("  Config keys:  {}", spec.config.required.len());
    println!("  Dependencies: {}", spec.depends.len());
    println!("  Init steps:   {}", spec.init.steps.len());
    println!("  Fix-ups:      {}", spec.fixups.len());
    println!("  Marker:       {}", spec.marker.path.display());
    println!("  Launch:       {} ({:?})", spec.launch.command.join(" "), spec.launch.mode);
    Ok(0)
}
