// ─── Configuration ───
// One value, built by the CLI, passed by reference into the job. No
// process-wide state.

use std::path::{Path, PathBuf};

use crate::core::error::{PackError, PackResult};

/// Which side of the pack is being materialized. Side-specific switches live
/// on their variant so they cannot be set for the wrong side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Side {
    Client {
        /// Emit a MultiMC-style instance folder instead of a raw tree.
        multimc: bool,
    },
    Server {
        /// Write an `eula.txt` acceptance file into the output.
        eula: bool,
    },
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Path or http(s) URL of the modpack zip.
    pub input: String,
    /// Output folder or `.zip` path.
    pub output: PathBuf,
    pub side: Side,
    /// Number of parallel download workers. Clamped to the reference count
    /// once the manifest is parsed.
    pub threads: usize,
    /// Suppress progress output. The final report prints regardless.
    pub quiet: bool,
    /// Parent directory for the per-run staging root.
    pub tmp: PathBuf,
    /// Skip mod-loader resolution and install entirely.
    pub no_loader: bool,
    /// Keep the staging root after the run.
    pub keep_tmp: bool,
    /// Put the pack tree at the root of the output zip instead of wrapping
    /// it in a named folder entry.
    pub root_zip: bool,
    /// Pack name override. Defaults to the manifest's name.
    pub name: Option<String>,
    /// Consult the remote metadata service before falling back to
    /// host-redirect resolution.
    pub remote_metadata: bool,
    /// Replace existing subtrees in a folder destination.
    pub delete_existing: bool,
    /// Allow writing into a non-empty folder / over an existing zip.
    pub overwrite: bool,
}

/// What the output path turned out to be after preflight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Directory(PathBuf),
    Zip(PathBuf),
}

impl PackConfig {
    pub fn is_client(&self) -> bool {
        matches!(self.side, Side::Client { .. })
    }

    pub fn multimc(&self) -> bool {
        matches!(self.side, Side::Client { multimc: true })
    }

    pub fn eula(&self) -> bool {
        matches!(self.side, Side::Server { eula: true })
    }

    /// `--delete` implies permission to write into a non-empty destination.
    pub fn may_overwrite(&self) -> bool {
        self.overwrite || self.delete_existing
    }

    /// Classify and prepare the output path. Runs before any extraction or
    /// network traffic so precondition violations fail fast.
    pub fn validate_output(&self) -> PackResult<OutputTarget> {
        let output = &self.output;
        if output.exists() {
            if output.is_dir() {
                let occupied = output
                    .read_dir()
                    .map_err(|e| PackError::io(output.clone(), e))?
                    .next()
                    .is_some();
                if occupied && !self.may_overwrite() {
                    return Err(PackError::OutputPath(format!(
                        "output folder {} is not empty and neither --override nor --delete is set",
                        output.display()
                    )));
                }
                return Ok(OutputTarget::Directory(output.clone()));
            }
            if output.is_file() {
                if !self.may_overwrite() {
                    return Err(PackError::OutputPath(format!(
                        "output file {} exists and --override is not set",
                        output.display()
                    )));
                }
                if !has_extension(output, "zip") {
                    return Err(PackError::OutputPath(format!(
                        "output file {} is not a zip file",
                        output.display()
                    )));
                }
                return Ok(OutputTarget::Zip(output.clone()));
            }
            return Err(PackError::OutputPath(format!(
                "output {} exists but is neither a file nor a folder",
                output.display()
            )));
        }

        // Missing path: the extension decides what gets created.
        match output.extension().and_then(|e| e.to_str()) {
            None => {
                std::fs::create_dir_all(output).map_err(|e| PackError::io(output.clone(), e))?;
                Ok(OutputTarget::Directory(output.clone()))
            }
            Some(ext) if ext.eq_ignore_ascii_case("zip") => {
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| PackError::io(parent.to_path_buf(), e))?;
                }
                Ok(OutputTarget::Zip(output.clone()))
            }
            Some(_) => Err(PackError::OutputPath(format!(
                "output {} is neither a folder nor a zip file",
                output.display()
            ))),
        }
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}
