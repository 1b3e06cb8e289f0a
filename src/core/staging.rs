// ─── Staging ───
// Per-run scratch area: three disjoint directories under a collision-free
// root, removed when the run ends unless explicitly retained.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::error::{PackError, PackResult};

const ROOT_PREFIX: &str = "packdl";

/// The run's staging tree.
///
/// - `unzip/`    — extracted archive contents
/// - `download/` — downloaded mod files
/// - `out/`      — assembled output tree
pub struct Staging {
    root: PathBuf,
    keep: bool,
}

impl Staging {
    /// Probe `<parent>/packdl_0`, `_1`, … and claim the first non-existing
    /// root. Directory-name collision avoidance at creation time makes the
    /// tree process-exclusive for the run.
    pub fn create(parent: &Path, keep: bool) -> PackResult<Self> {
        let mut index = 0usize;
        let root = loop {
            let candidate = parent.join(format!("{}_{}", ROOT_PREFIX, index));
            if !candidate.exists() {
                break candidate;
            }
            index += 1;
        };

        std::fs::create_dir_all(&root).map_err(|e| PackError::io(&root, e))?;
        let staging = Self { root, keep };
        for dir in [
            staging.unzip_dir(),
            staging.download_dir(),
            staging.out_dir(),
        ] {
            std::fs::create_dir(&dir).map_err(|e| PackError::io(&dir, e))?;
        }

        info!("Staging in {}", staging.root.display());
        Ok(staging)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unzip_dir(&self) -> PathBuf {
        self.root.join("unzip")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root.join("download")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.keep {
            info!("Keeping staging directory {}", self.root.display());
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            warn!("Could not clean staging {}: {}", self.root.display(), e);
        }
    }
}
