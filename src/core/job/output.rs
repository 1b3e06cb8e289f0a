// ─── Output Assembly ───
// Builds the final tree in the staging `out/` directory, then materializes
// it at the destination: merged into a folder, or written as a zip archive.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::archive;
use crate::core::config::{OutputTarget, PackConfig};
use crate::core::error::{PackError, PackResult};
use crate::core::loader::LoaderOutcome;
use crate::core::manifest::Manifest;
use crate::core::staging::Staging;

pub struct OutputAssembler<'a> {
    config: &'a PackConfig,
    staging: &'a Staging,
}

impl<'a> OutputAssembler<'a> {
    pub fn new(config: &'a PackConfig, staging: &'a Staging) -> Self {
        Self { config, staging }
    }

    /// Build the output tree: mods, overrides, and the side-specific extras
    /// (EULA file for servers, instance descriptor for package-manager
    /// clients).
    pub fn assemble(
        &self,
        manifest: &Manifest,
        loader: Option<&LoaderOutcome>,
        pack_name: &str,
    ) -> PackResult<()> {
        let out_dir = self.staging.out_dir();

        let tree_root = if self.config.multimc() {
            self.make_instance(&out_dir, manifest, loader, pack_name)?
        } else {
            if self.config.eula() {
                write_eula(&out_dir)?;
            }
            out_dir
        };

        copy_dir_recursive(&self.staging.download_dir(), &tree_root.join("mods"))?;

        let overrides = self.staging.unzip_dir().join(&manifest.overrides);
        if overrides.is_dir() {
            copy_dir_recursive(&overrides, &tree_root)?;
        } else {
            warn!(
                "Archive declares overrides '{}' but has no such directory",
                manifest.overrides
            );
        }

        Ok(())
    }

    /// Create the instance folder with its `key=value` descriptor and return
    /// the game directory the pack contents go into.
    fn make_instance(
        &self,
        out_dir: &Path,
        manifest: &Manifest,
        loader: Option<&LoaderOutcome>,
        pack_name: &str,
    ) -> PackResult<PathBuf> {
        let instance_dir = out_dir.join(pack_name);
        std::fs::create_dir_all(&instance_dir).map_err(|e| PackError::io(&instance_dir, e))?;

        let mut descriptor = format!(
            "InstanceType=OneSix\nIntendedVersion={}\nname={}",
            manifest.minecraft.version, pack_name
        );
        if let Some(build) = loader.and_then(|outcome| outcome.resolved_build.as_ref()) {
            descriptor.push_str("\nForgeVersion=");
            descriptor.push_str(&build.qualifier());
        }
        descriptor.push('\n');

        let descriptor_path = instance_dir.join("instance.cfg");
        std::fs::write(&descriptor_path, descriptor)
            .map_err(|e| PackError::io(&descriptor_path, e))?;

        let game_dir = instance_dir.join("minecraft");
        std::fs::create_dir_all(&game_dir).map_err(|e| PackError::io(&game_dir, e))?;
        Ok(game_dir)
    }

    /// Materialize the assembled tree at the destination.
    pub async fn materialize(&self, target: &OutputTarget, pack_name: &str) -> PackResult<()> {
        match target {
            OutputTarget::Directory(dest) => self.merge_into_directory(dest),
            OutputTarget::Zip(dest) => self.write_zip(dest, pack_name).await,
        }
    }

    /// Merge the assembled tree into an existing directory. An empty
    /// destination takes the whole tree; otherwise subtrees are replaced
    /// when `--delete` is set and merged non-destructively when not.
    fn merge_into_directory(&self, dest: &Path) -> PackResult<()> {
        let out_dir = self.staging.out_dir();

        let occupied = dest
            .read_dir()
            .map_err(|e| PackError::io(dest, e))?
            .next()
            .is_some();
        if !occupied {
            return copy_dir_recursive(&out_dir, dest);
        }

        for entry in std::fs::read_dir(&out_dir).map_err(|e| PackError::io(&out_dir, e))? {
            let entry = entry.map_err(|e| PackError::io(&out_dir, e))?;
            let source = entry.path();
            let target = dest.join(entry.file_name());

            if source.is_dir() {
                if target.exists() && self.config.delete_existing {
                    std::fs::remove_dir_all(&target).map_err(|e| PackError::io(&target, e))?;
                }
                copy_dir_recursive(&source, &target)?;
            } else {
                std::fs::copy(&source, &target).map_err(|e| PackError::io(&target, e))?;
            }
        }
        Ok(())
    }

    /// Write the assembled tree as a compressed archive, replacing any
    /// pre-existing file. Unless the tree goes at the archive root, it is
    /// wrapped in a single folder entry named after the pack.
    async fn write_zip(&self, dest: &Path, pack_name: &str) -> PackResult<()> {
        if dest.exists() {
            std::fs::remove_file(dest).map_err(|e| PackError::io(dest, e))?;
        }

        let wrap = !(self.config.root_zip || self.config.multimc());
        let task = archive::compress_dir(
            &self.staging.out_dir(),
            dest,
            wrap.then(|| pack_name.to_string()),
        );
        if !self.config.quiet {
            archive::spawn_progress_logger(task.progress(), "Zipping");
        }
        task.wait().await?;

        info!("Wrote output archive {}", dest.display());
        Ok(())
    }
}

/// Deep-copy a directory tree, creating destinations and overwriting files.
pub fn copy_dir_recursive(source: &Path, destination: &Path) -> PackResult<()> {
    std::fs::create_dir_all(destination).map_err(|e| PackError::io(destination, e))?;

    for entry in std::fs::read_dir(source).map_err(|e| PackError::io(source, e))? {
        let entry = entry.map_err(|e| PackError::io(source, e))?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| PackError::io(&src_path, e))?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            std::fs::copy(&src_path, &dst_path).map_err(|e| PackError::io(&dst_path, e))?;
        }
    }

    Ok(())
}

fn write_eula(out_dir: &Path) -> PackResult<()> {
    let path = out_dir.join("eula.txt");
    let contents = format!(
        "#Accepted via packdl\n#https://account.mojang.com/documents/minecraft_eula\n#{}\neula=true\n",
        chrono::Local::now().format("%a %b %e %T %Y")
    );
    std::fs::write(&path, contents).map_err(|e| PackError::io(&path, e))
}
