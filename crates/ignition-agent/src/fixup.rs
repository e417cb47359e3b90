//! Permission and ownership repair
//!
//! Runs before every launch, initialized or not. Volumes mounted from the
//! host often come back owned by the wrong uid; each entry puts one path
//! (optionally a whole tree) back the way the daemon expects.

use crate::error::{AgentError, Result};
use ignition_spec::{parse_mode, FixupSpec};
use nix::unistd::{chown, Gid, Group, Uid, User};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// A fix-up entry with owner, group and modes resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    path: PathBuf,
    uid: Option<Uid>,
    gid: Option<Gid>,
    mode: Option<u32>,
    file_mode: Option<u32>,
    recursive: bool,
    optional: bool,
}

/// Counts of entries touched by one fix-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixupReport {
    pub directories: usize,
    pub files: usize,
    pub skipped: bool,
}

impl Fixup {
    /// Resolve user and group names and parse the octal modes
    pub fn from_spec(spec: &FixupSpec) -> Result<Self> {
        let fail = |reason: String| AgentError::FixupFailed {
            path: spec.path.clone(),
            reason,
        };

        let uid = spec
            .owner
            .as_deref()
            .map(|owner| resolve_user(owner).map_err(&fail))
            .transpose()?;
        let gid = spec
            .group
            .as_deref()
            .map(|group| resolve_group(group).map_err(&fail))
            .transpose()?;
        let mode = spec
            .mode
            .as_deref()
            .map(|m| parse_mode(m).ok_or_else(|| fail(format!("invalid mode '{}'", m))))
            .transpose()?;
        let file_mode = spec
            .file_mode
            .as_deref()
            .map(|m| parse_mode(m).ok_or_else(|| fail(format!("invalid file mode '{}'", m))))
            .transpose()?;

        Ok(Self {
            path: spec.path.clone(),
            uid,
            gid,
            mode,
            file_mode,
            recursive: spec.recursive,
            optional: spec.optional,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply ownership and modes.
    ///
    /// The root path always gets `mode`. Inside a recursive walk, directories
    /// get `mode` and regular files get `file_mode`; files are left alone
    /// when no `file_mode` is given. Symlinks are never followed.
    pub fn apply(&self) -> Result<FixupReport> {
        let mut report = FixupReport::default();

        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.optional => {
                tracing::debug!(path = %self.path.display(), "Optional fix-up path missing, skipping");
                report.skipped = true;
                return Ok(report);
            }
            Err(e) => return Err(self.fail(&self.path, e)),
        };

        self.fix_entry(&self.path, self.mode)?;
        if metadata.is_dir() {
            report.directories += 1;
            if self.recursive {
                self.walk(&self.path, &mut report)?;
            }
        } else {
            report.files += 1;
        }

        tracing::info!(
            path = %self.path.display(),
            directories = report.directories,
            files = report.files,
            "Fix-up applied"
        );
        Ok(report)
    }

    fn walk(&self, dir: &Path, report: &mut FixupReport) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| self.fail(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| self.fail(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| self.fail(&path, e))?;

            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                self.fix_entry(&path, self.mode)?;
                report.directories += 1;
                self.walk(&path, report)?;
            } else {
                self.fix_entry(&path, self.file_mode)?;
                report.files += 1;
            }
        }
        Ok(())
    }

    fn fix_entry(&self, path: &Path, mode: Option<u32>) -> Result<()> {
        if self.uid.is_some() || self.gid.is_some() {
            chown(path, self.uid, self.gid).map_err(|e| AgentError::FixupFailed {
                path: path.to_path_buf(),
                reason: format!("chown: {}", e),
            })?;
        }
        if let Some(mode) = mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(|e| self.fail(path, e))?;
        }
        Ok(())
    }

    fn fail(&self, path: &Path, err: std::io::Error) -> AgentError {
        AgentError::FixupFailed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Apply every fix-up in order, stopping at the first failure
pub fn apply_all(fixups: &[FixupSpec]) -> Result<Vec<FixupReport>> {
    fixups
        .iter()
        .map(|spec| Fixup::from_spec(spec)?.apply())
        .collect()
}

fn resolve_user(owner: &str) -> std::result::Result<Uid, String> {
    if let Ok(id) = owner.parse::<u32>() {
        return Ok(Uid::from_raw(id));
    }
    match User::from_name(owner) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(format!("unknown user '{}'", owner)),
        Err(e) => Err(format!("cannot look up user '{}': {}", owner, e)),
    }
}

fn resolve_group(group: &str) -> std::result::Result<Gid, String> {
    if let Ok(id) = group.parse::<u32>() {
        return Ok(Gid::from_raw(id));
    }
    match Group::from_name(group) {
        Ok(Some(g)) => Ok(g.gid),
        Ok(None) => Err(format!("unknown group '{}'", group)),
        Err(e) => Err(format!("cannot look up group '{}': {}", group, e)),
    }
}
