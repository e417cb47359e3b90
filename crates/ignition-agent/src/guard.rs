//! Bootstrap marker handling

use crate::error::{AgentError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Decides whether first-run initialization already happened.
///
/// The only state is the marker path: present means initialized. The guard
/// never deletes the marker; removing it is an operator reset.
#[derive(Debug, Clone)]
pub struct BootstrapGuard {
    marker: PathBuf,
}

impl BootstrapGuard {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Whether the marker (file or directory) exists.
    ///
    /// A marker that cannot be checked is an error, never "absent": init
    /// must not run a second time because of a stat failure.
    pub fn is_initialized(&self) -> Result<bool> {
        self.marker
            .try_exists()
            .map_err(|e| AgentError::MarkerUnreadable {
                path: self.marker.clone(),
                reason: e.to_string(),
            })
    }

    /// Write the marker atomically: temp file in the same directory, then rename.
    pub(crate) fn mark(&self, service: &str) -> Result<()> {
        let fail = |reason: String| AgentError::InitFailed {
            service: service.to_string(),
            step: "marker".to_string(),
            reason,
        };

        let parent = self
            .marker
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .map_err(|e| fail(format!("cannot create {}: {}", parent.display(), e)))?;

        let file_name = self
            .marker
            .file_name()
            .ok_or_else(|| fail(format!("invalid marker path {}", self.marker.display())))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".tmp");
        let tmp = parent.join(tmp_name);

        let content = format!(
            "service={}\ninitialized_at={}\n",
            service,
            chrono::Utc::now().to_rfc3339()
        );

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp, &self.marker)
        };
        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            fail(format!("cannot write {}: {}", self.marker.display(), e))
        })?;

        tracing::info!(service = %service, marker = %self.marker.display(), "Bootstrap marker written");
        Ok(())
    }
}
