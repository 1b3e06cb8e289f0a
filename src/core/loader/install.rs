// ─── Loader Resolver ───
// Walks the manifest's mod-loader declarations, resolves the declared
// version against the version index, downloads the installer artifact and,
// for server installs, runs it unattended. External failures degrade the
// outcome instead of aborting the run: the user is told to install the
// loader manually.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use md5::{Digest, Md5};
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::core::config::PackConfig;
use crate::core::downloader::download_to_file;
use crate::core::error::{PackError, PackResult};
use crate::core::http::file_name_from_url;
use crate::core::loader::index::{artifact_url, LoaderBuild, VersionIndex};
use crate::core::manifest::{LoaderRef, Manifest};

/// Namespace prefix of the loader family this resolver can install.
const SUPPORTED_PREFIX: &str = "forge-";
/// Unattended server install switch understood by the installer.
const INSTALLER_ARG: &str = "--installServer";

/// Terminal state of loader handling for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderStatus {
    /// No supported loader declared; nothing to do.
    NotNeeded,
    /// Resolution or install could not complete. The declared version and
    /// the reason are surfaced in the final report.
    Degraded { declared: String, reason: String },
    /// Build resolved; the install step is intentionally not run on this
    /// side (clients, or package-manager mode).
    InstallSkipped,
    /// The server installer ran to successful completion.
    Installed,
}

/// What loader handling produced, consumed by output assembly and the final
/// report.
#[derive(Debug, Clone)]
pub struct LoaderOutcome {
    pub status: LoaderStatus,
    /// Build record, when resolution got that far. Drives the instance
    /// descriptor's loader version line.
    pub resolved_build: Option<LoaderBuild>,
    /// Declarations outside the supported family, verbatim ids.
    pub unsupported: Vec<String>,
}

impl LoaderOutcome {
    fn not_needed(unsupported: Vec<String>) -> Self {
        Self {
            status: LoaderStatus::NotNeeded,
            resolved_build: None,
            unsupported,
        }
    }
}

/// Result of scanning the manifest's loader declarations.
struct LoaderScan {
    declared_version: Option<String>,
    unsupported: Vec<String>,
}

/// At most one declaration may belong to the supported family; more than one
/// makes the manifest self-contradictory.
fn detect_version(loaders: &[LoaderRef]) -> PackResult<LoaderScan> {
    let mut declared_version = None;
    let mut unsupported = Vec::new();

    for loader in loaders {
        if let Some(version) = loader.id.strip_prefix(SUPPORTED_PREFIX) {
            if declared_version.is_some() {
                return Err(PackError::ManifestInvalid(
                    "multiple forge loader declarations".to_string(),
                ));
            }
            info!("Found forge version: {}", version);
            declared_version = Some(version.to_string());
        } else {
            warn!("Unsupported mod-loader, install manually: {}", loader.id);
            unsupported.push(loader.id.clone());
        }
    }

    Ok(LoaderScan {
        declared_version,
        unsupported,
    })
}

/// Drives loader resolution for one run.
pub struct LoaderResolver<'a> {
    config: &'a PackConfig,
    client: &'a Client,
    /// Output staging tree; the installer lands and runs here.
    out_dir: &'a Path,
}

impl<'a> LoaderResolver<'a> {
    pub fn new(config: &'a PackConfig, client: &'a Client, out_dir: &'a Path) -> Self {
        Self {
            config,
            client,
            out_dir,
        }
    }

    /// Run the state machine to its terminal state. Only a self-
    /// contradictory manifest is a hard error; everything external degrades.
    pub async fn run(&self, manifest: &Manifest) -> PackResult<LoaderOutcome> {
        let scan = detect_version(&manifest.minecraft.mod_loaders)?;
        let Some(declared) = scan.declared_version else {
            return Ok(LoaderOutcome::not_needed(scan.unsupported));
        };

        let degraded = |reason: String| LoaderOutcome {
            status: LoaderStatus::Degraded {
                declared: declared.clone(),
                reason,
            },
            resolved_build: None,
            unsupported: scan.unsupported.clone(),
        };

        let index = match VersionIndex::fetch(self.client).await {
            Ok(index) => index,
            Err(e) => {
                warn!("Loader index fetch failed, install the loader manually: {}", e);
                return Ok(degraded(format!("version index unavailable: {e}")));
            }
        };

        let Some(build) = index
            .resolve_build(&declared, &manifest.minecraft.version)
            .cloned()
        else {
            warn!("No loader build found for '{}', install the loader manually", declared);
            return Ok(degraded(format!("no build record for '{declared}'")));
        };
        info!("Resolved loader build: {}", build.qualifier());

        // Package-manager mode records the build for the instance descriptor
        // and leaves installation to the instance manager.
        if self.config.multimc() {
            return Ok(LoaderOutcome {
                status: LoaderStatus::InstallSkipped,
                resolved_build: Some(build),
                unsupported: scan.unsupported,
            });
        }

        let installer = match self.download_installer(&index, &build).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Installer download failed, install the loader manually: {}", e);
                return Ok(LoaderOutcome {
                    status: LoaderStatus::Degraded {
                        declared,
                        reason: e.to_string(),
                    },
                    resolved_build: Some(build),
                    unsupported: scan.unsupported,
                });
            }
        };

        if self.config.is_client() {
            // The installer jar stays in the output for the user to run.
            return Ok(LoaderOutcome {
                status: LoaderStatus::InstallSkipped,
                resolved_build: Some(build),
                unsupported: scan.unsupported,
            });
        }

        let status = match self.run_installer(&installer).await? {
            Some(0) => {
                let _ = tokio::fs::remove_file(&installer).await;
                info!("Loader {} installed", build.qualifier());
                LoaderStatus::Installed
            }
            code => {
                warn!(
                    "Installer had non-zero exit ({:?}). Possible errors installing the loader.",
                    code
                );
                LoaderStatus::Degraded {
                    declared,
                    reason: format!("installer exited with status {:?}", code),
                }
            }
        };

        Ok(LoaderOutcome {
            status,
            resolved_build: Some(build),
            unsupported: scan.unsupported,
        })
    }

    /// Download the build's installer artifact into the output tree and
    /// verify it against the catalog checksum.
    async fn download_installer(
        &self,
        index: &VersionIndex,
        build: &LoaderBuild,
    ) -> PackResult<PathBuf> {
        let Some(artifact) = build.installer_artifact() else {
            return Err(PackError::Loader(format!(
                "build {} has no installer artifact",
                build.qualifier()
            )));
        };

        let url = artifact_url(&index.artifact, build, artifact);
        let file_name = file_name_from_url(&url).ok_or_else(|| PackError::InvalidUrl {
            url: url.clone(),
            reason: "no file name in artifact URL".to_string(),
        })?;
        let dest = self.out_dir.join(&file_name);

        info!("Downloading loader installer {}", file_name);
        download_to_file(self.client, &url, &dest).await?;
        verify_md5(&dest, &artifact.md5).await?;

        Ok(dest)
    }

    /// Launch the installer unattended in the output tree, stream its merged
    /// output into the run log, and wait for exit.
    async fn run_installer(&self, installer: &Path) -> PackResult<Option<i32>> {
        let installer_name = installer
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| installer.to_string_lossy().to_string());

        info!(
            "Running loader installer with command: java -jar {} {}",
            installer_name, INSTALLER_ARG
        );

        let mut child = Command::new("java")
            .arg("-jar")
            .arg(&installer_name)
            .arg(INSTALLER_ARG)
            .current_dir(self.out_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PackError::InstallerExec(e.to_string()))?;

        // Error output joins standard output in the run log.
        let stdout_task = child.stdout.take().map(|out| tokio::spawn(stream_lines(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(stream_lines(err)));

        let status = child
            .wait()
            .await
            .map_err(|e| PackError::InstallerExec(e.to_string()))?;

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        Ok(status.code())
    }
}

async fn stream_lines<R>(reader: R)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("installer: {}", line);
    }
}

async fn verify_md5(path: &Path, expected: &str) -> PackResult<()> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PackError::io(path, e))?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PackError::Md5Mismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(id: &str) -> LoaderRef {
        serde_json::from_str(&format!(r#"{{ "id": "{}" }}"#, id)).unwrap()
    }

    #[test]
    fn a_single_forge_declaration_yields_its_version() {
        let scan = detect_version(&[loader("forge-14.23.5.2768")]).unwrap();
        assert_eq!(scan.declared_version.as_deref(), Some("14.23.5.2768"));
        assert!(scan.unsupported.is_empty());
    }

    #[test]
    fn aliases_survive_the_prefix_strip() {
        let scan = detect_version(&[loader("forge-recommended")]).unwrap();
        assert_eq!(scan.declared_version.as_deref(), Some("recommended"));
    }

    #[test]
    fn conflicting_forge_declarations_are_fatal() {
        let result = detect_version(&[loader("forge-14.23.5.2768"), loader("forge-latest")]);
        assert!(matches!(result, Err(PackError::ManifestInvalid(_))));
    }

    #[test]
    fn unsupported_loaders_are_collected_not_fatal() {
        let scan =
            detect_version(&[loader("fabric-0.14.9"), loader("forge-14.23.5.2768")]).unwrap();
        assert_eq!(scan.declared_version.as_deref(), Some("14.23.5.2768"));
        assert_eq!(scan.unsupported, vec!["fabric-0.14.9".to_string()]);
    }

    #[test]
    fn zero_declarations_mean_not_needed() {
        let scan = detect_version(&[]).unwrap();
        assert!(scan.declared_version.is_none());
        assert!(scan.unsupported.is_empty());
    }

    #[tokio::test]
    async fn md5_verification_accepts_and_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.jar");
        tokio::fs::write(&path, b"payload").await.unwrap();

        // md5("payload")
        let expected = "321c3cf486ed509164edec1e1981fec8";
        verify_md5(&path, expected).await.unwrap();
        verify_md5(&path, &expected.to_uppercase()).await.unwrap();

        assert!(matches!(
            verify_md5(&path, "00000000000000000000000000000000").await,
            Err(PackError::Md5Mismatch { .. })
        ));
    }
}
