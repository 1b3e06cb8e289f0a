// ─── Manifest ───
// The declarative pack document shipped inside the modpack zip. Parsed once,
// shared read-only across the download workers.

use std::path::PathBuf;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::core::error::{PackError, PackResult};

/// Name of the manifest entry inside the pack archive.
pub const MANIFEST_ENTRY: &str = "manifest.json";

const SUPPORTED_TYPE: &str = "minecraftModpack";
const SUPPORTED_VERSION: u64 = 1;

/// Top-level pack manifest.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub minecraft: MinecraftSpec,
    #[serde(rename = "manifestType")]
    pub manifest_type: String,
    #[serde(rename = "manifestVersion")]
    pub manifest_version: u64,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub files: Vec<ModReference>,
    /// Directory inside the archive whose contents are copied verbatim into
    /// the output.
    pub overrides: String,
}

/// Target game version plus declared mod-loaders.
#[derive(Debug, Deserialize)]
pub struct MinecraftSpec {
    pub version: String,
    #[serde(rename = "modLoaders", default)]
    pub mod_loaders: Vec<LoaderRef>,
}

/// One declared mod-loader, identified by a namespaced id such as
/// `forge-14.23.5.2768`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderRef {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

/// One downloadable file reference. The resolution slot is written exactly
/// once, by whichever worker claims this reference.
#[derive(Debug, Deserialize)]
pub struct ModReference {
    #[serde(rename = "projectID")]
    pub project_id: u32,
    #[serde(rename = "fileID")]
    pub file_id: u32,
    #[serde(default)]
    pub required: bool,
    /// Pre-known download URL, when the manifest carries one. Used verbatim
    /// by the first resolution strategy.
    #[serde(rename = "downloadUrl", default)]
    pub download_url: Option<String>,
    #[serde(skip)]
    resolution: OnceLock<ResolvedMod>,
}

/// Terminal resolution state of a successfully downloaded reference.
#[derive(Debug, Clone)]
pub struct ResolvedMod {
    pub project_name: String,
    pub file_name: String,
    pub url: String,
    /// Staged file location in the download directory.
    pub path: PathBuf,
}

impl ModReference {
    pub fn resolved(&self) -> Option<&ResolvedMod> {
        self.resolution.get()
    }

    /// Record the terminal resolution. Write-once: a second write would mean
    /// two workers claimed the same index.
    pub fn mark_resolved(&self, resolved: ResolvedMod) {
        let outcome = self.resolution.set(resolved);
        debug_assert!(outcome.is_ok(), "reference resolved twice");
    }
}

/// Cheap schema gate, run on the raw manifest text before the typed parse
/// and before any network traffic.
pub fn validate_schema(raw: &str) -> PackResult<()> {
    let root: serde_json::Value = serde_json::from_str(raw)?;

    let version = root.get("manifestVersion").and_then(|v| v.as_u64());
    if version != Some(SUPPORTED_VERSION) {
        return Err(PackError::ManifestInvalid(format!(
            "manifestVersion mismatch, only {} is supported",
            SUPPORTED_VERSION
        )));
    }

    let kind = root.get("manifestType").and_then(|v| v.as_str());
    if kind != Some(SUPPORTED_TYPE) {
        return Err(PackError::ManifestInvalid(format!(
            "manifestType must be '{}'",
            SUPPORTED_TYPE
        )));
    }

    Ok(())
}

/// Validate the schema gate and parse the typed manifest.
pub fn parse_manifest(raw: &str) -> PackResult<Manifest> {
    validate_schema(raw)?;
    let manifest: Manifest = serde_json::from_str(raw)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "minecraft": {
            "version": "1.12.2",
            "modLoaders": [{ "id": "forge-14.23.5.2768", "primary": true }]
        },
        "manifestType": "minecraftModpack",
        "manifestVersion": 1,
        "name": "Example Pack",
        "version": "1.0.0",
        "author": "someone",
        "files": [
            { "projectID": 1234, "fileID": 5678, "required": true },
            { "projectID": 9999, "fileID": 1111 }
        ],
        "overrides": "overrides"
    }"#;

    #[test]
    fn parses_a_complete_manifest() {
        let manifest = parse_manifest(SAMPLE).unwrap();
        assert_eq!(manifest.name, "Example Pack");
        assert_eq!(manifest.minecraft.version, "1.12.2");
        assert_eq!(manifest.minecraft.mod_loaders.len(), 1);
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].project_id, 1234);
        assert!(manifest.files[0].required);
        // `required` defaults to false when absent.
        assert!(!manifest.files[1].required);
        assert_eq!(manifest.overrides, "overrides");
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let raw = SAMPLE.replace("\"manifestVersion\": 1", "\"manifestVersion\": 2");
        assert!(matches!(
            validate_schema(&raw),
            Err(PackError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn rejects_unexpected_type_tag() {
        let raw = SAMPLE.replace("minecraftModpack", "somethingElse");
        assert!(matches!(
            validate_schema(&raw),
            Err(PackError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn resolution_slot_is_write_once() {
        let manifest = parse_manifest(SAMPLE).unwrap();
        let reference = &manifest.files[0];
        assert!(reference.resolved().is_none());

        reference.mark_resolved(ResolvedMod {
            project_name: "example".to_string(),
            file_name: "example-1.0.jar".to_string(),
            url: "https://example.com/example-1.0.jar".to_string(),
            path: PathBuf::from("/tmp/example-1.0.jar"),
        });
        assert_eq!(
            reference.resolved().unwrap().file_name,
            "example-1.0.jar"
        );
    }
}
