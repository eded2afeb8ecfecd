//! Staged run directories
//!
//! Artifacts for one run are written under `<runs>/.staging/<run_id>/` and
//! only become visible at `<runs>/<run_id>/` on [`StagedRun::commit`]. The
//! previously committed directory survives any failure before the final
//! rename.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const STAGING_DIR: &str = ".staging";
const BACKUP_SUFFIX: &str = ".previous";

/// One in-flight run's staging area
#[derive(Debug)]
pub struct StagedRun {
    run_id: String,
    staging: PathBuf,
    target: PathBuf,
    finished: bool,
}

impl StagedRun {
    /// Create a fresh staging directory, clearing anything left by an
    /// interrupted run with the same id.
    pub fn begin(runs_root: &Path, run_id: &str) -> Result<Self> {
        let staging = runs_root.join(STAGING_DIR).join(run_id);
        if staging.exists() {
            warn!("Clearing stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        debug!("Staging run {} at {}", run_id, staging.display());

        Ok(Self {
            run_id: run_id.to_string(),
            target: runs_root.join(run_id),
            staging,
            finished: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn target_dir(&self) -> &Path {
        &self.target
    }

    /// Write one artifact into staging (tmp file, then rename).
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(Error::Staging(format!("invalid artifact name: {}", name)));
        }
        let path = self.staging.join(name);
        let tmp_path = self.staging.join(format!(".{}.tmp", name));
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }

    /// Replace the committed run directory with the staged one.
    pub fn commit(&mut self) -> Result<PathBuf> {
        if !self.staging.is_dir() {
            return Err(Error::Staging(format!(
                "no staging directory for run {}",
                self.run_id
            )));
        }

        let backup = self
            .target
            .with_file_name(format!("{}{}", self.run_id, BACKUP_SUFFIX));
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }

        let had_previous = self.target.exists();
        if had_previous {
            fs::rename(&self.target, &backup)?;
        }

        if let Err(e) = fs::rename(&self.staging, &self.target) {
            if had_previous {
                if let Err(restore) = fs::rename(&backup, &self.target) {
                    warn!("Failed to restore previous run {}: {}", self.run_id, restore);
                }
            }
            return Err(Error::Staging(format!(
                "commit of run {} failed: {}",
                self.run_id, e
            )));
        }

        if had_previous {
            fs::remove_dir_all(&backup)?;
        }

        self.finished = true;
        info!("Committed run {} to {}", self.run_id, self.target.display());
        Ok(self.target.clone())
    }

    /// Discard staging. The committed directory is untouched.
    pub fn rollback(&mut self) -> Result<()> {
        self.finished = true;
        if self.staging.exists() {
            fs::remove_dir_all(&self.staging)?;
            debug!("Rolled back staging for run {}", self.run_id);
        }
        Ok(())
    }
}

impl Drop for StagedRun {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.rollback() {
                warn!("Failed to roll back staging for {}: {}", self.run_id, e);
            }
        }
    }
}
