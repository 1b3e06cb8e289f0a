// ─── Loader Version Index ───
// The Forge maven's version catalog: build number → build record, plus a
// promotion table mapping `<mcversion>-recommended|latest` aliases onto
// build numbers. Fetched once per run, read-only afterward.

use std::collections::HashMap;

use reqwest::Client;
use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::core::error::PackResult;

pub const FORGE_MAVEN: &str = "https://files.minecraftforge.net/maven/net/minecraftforge/forge/";
pub const FORGE_INDEX_URL: &str =
    "https://files.minecraftforge.net/maven/net/minecraftforge/forge/json";

/// Version catalog for the supported loader family.
#[derive(Debug, Deserialize)]
pub struct VersionIndex {
    /// Maven artifact name, e.g. `forge`.
    pub artifact: String,
    /// Build number → build record.
    pub number: HashMap<String, LoaderBuild>,
    /// Promotion alias (`<mcversion>-recommended`, `<mcversion>-latest`)
    /// → build number.
    #[serde(default)]
    pub promos: HashMap<String, u64>,
}

/// One published loader build.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderBuild {
    #[serde(default)]
    pub branch: Option<String>,
    pub build: u64,
    pub mcversion: String,
    pub version: String,
    #[serde(default)]
    pub files: Vec<ArtifactFile>,
}

/// One artifact descriptor. On the wire this is a bare 3-element array
/// `[extension, type, checksum]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub extension: String,
    pub kind: String,
    pub md5: String,
}

impl<'de> Deserialize<'de> for ArtifactFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts = Vec::<String>::deserialize(deserializer)?;
        let len = parts.len();
        let [extension, kind, md5]: [String; 3] = parts
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"an [extension, type, checksum] triple"))?;
        Ok(ArtifactFile {
            extension,
            kind,
            md5,
        })
    }
}

impl Serialize for ArtifactFile {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.extension)?;
        seq.serialize_element(&self.kind)?;
        seq.serialize_element(&self.md5)?;
        seq.end()
    }
}

impl VersionIndex {
    /// Fetch the catalog from the loader maven.
    pub async fn fetch(client: &Client) -> PackResult<Self> {
        info!("Getting loader version index...");
        let index: VersionIndex = client
            .get(FORGE_INDEX_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!("Loaded {} loader builds", index.number.len());
        Ok(index)
    }

    /// Resolve a declared version string to a build record.
    ///
    /// `recommended` and `latest` go through the promotion table keyed by
    /// game version; anything else is a literal version whose build number
    /// is the segment after the last `.`.
    pub fn resolve_build(&self, declared: &str, mc_version: &str) -> Option<&LoaderBuild> {
        if declared.eq_ignore_ascii_case("recommended") || declared.eq_ignore_ascii_case("latest") {
            let key = format!("{}-{}", mc_version, declared.to_ascii_lowercase());
            let number = self.promos.get(&key)?;
            return self.number.get(&number.to_string());
        }
        let build_number = declared.rsplit('.').next()?;
        self.number.get(build_number)
    }
}

impl LoaderBuild {
    /// `<mcversion>-<version>[-<branch>]`, the qualifier used in both the
    /// artifact URL and the instance descriptor.
    pub fn qualifier(&self) -> String {
        let mut qualifier = format!("{}-{}", self.mcversion, self.version);
        if let Some(branch) = &self.branch {
            qualifier.push('-');
            qualifier.push_str(branch);
        }
        qualifier
    }

    /// Artifact whose type tag is `installer`, when the build ships one.
    pub fn installer_artifact(&self) -> Option<&ArtifactFile> {
        self.files
            .iter()
            .find(|file| file.kind.eq_ignore_ascii_case("installer"))
    }
}

/// Artifact URL from the fixed maven template:
/// `<maven><qualifier>/<artifact>-<qualifier>-<type>.<extension>`.
pub fn artifact_url(index_artifact: &str, build: &LoaderBuild, file: &ArtifactFile) -> String {
    let qualifier = build.qualifier();
    format!(
        "{}{}/{}-{}-{}.{}",
        FORGE_MAVEN, qualifier, index_artifact, qualifier, file.kind, file.extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VersionIndex {
        serde_json::from_str(
            r#"{
                "artifact": "forge",
                "number": {
                    "2768": {
                        "branch": null,
                        "build": 2768,
                        "mcversion": "1.12.2",
                        "version": "14.23.5.2768",
                        "files": [
                            ["jar", "universal", "aaaa"],
                            ["jar", "installer", "bbbb"],
                            ["txt", "changelog", "cccc"]
                        ]
                    },
                    "1234": {
                        "branch": "special",
                        "build": 1234,
                        "mcversion": "1.7.10",
                        "version": "10.13.4.1234",
                        "files": [["jar", "INSTALLER", "dddd"]]
                    }
                },
                "promos": {
                    "1.12.2-recommended": 2768,
                    "1.12.2-latest": 2768
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn artifact_descriptor_decodes_from_a_triple() {
        let file: ArtifactFile = serde_json::from_str(r#"["jar", "installer", "abc123"]"#).unwrap();
        assert_eq!(file.extension, "jar");
        assert_eq!(file.kind, "installer");
        assert_eq!(file.md5, "abc123");

        assert!(serde_json::from_str::<ArtifactFile>(r#"["jar", "installer"]"#).is_err());
    }

    #[test]
    fn artifact_descriptor_encodes_back_to_a_triple() {
        let file = ArtifactFile {
            extension: "jar".to_string(),
            kind: "installer".to_string(),
            md5: "abc123".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&file).unwrap(),
            r#"["jar","installer","abc123"]"#
        );
    }

    #[test]
    fn literal_version_looks_up_the_trailing_build_number() {
        let index = index();
        let build = index.resolve_build("14.23.5.2768", "1.12.2").unwrap();
        assert_eq!(build.build, 2768);
        assert_eq!(build.version, "14.23.5.2768");
    }

    #[test]
    fn aliases_go_through_the_promotion_table() {
        let index = index();
        assert_eq!(index.resolve_build("recommended", "1.12.2").unwrap().build, 2768);
        assert_eq!(index.resolve_build("latest", "1.12.2").unwrap().build, 2768);
        // No promotion entry for this game version.
        assert!(index.resolve_build("recommended", "1.16.5").is_none());
    }

    #[test]
    fn missing_build_resolves_to_none() {
        assert!(index().resolve_build("14.23.5.9999", "1.12.2").is_none());
    }

    #[test]
    fn installer_artifact_matches_case_insensitively() {
        let index = index();
        let plain = index.number.get("2768").unwrap();
        assert_eq!(plain.installer_artifact().unwrap().md5, "bbbb");
        let shouty = index.number.get("1234").unwrap();
        assert_eq!(shouty.installer_artifact().unwrap().md5, "dddd");
    }

    #[test]
    fn artifact_url_follows_the_maven_template() {
        let index = index();

        let build = index.number.get("2768").unwrap();
        let file = build.installer_artifact().unwrap();
        assert_eq!(
            artifact_url(&index.artifact, build, file),
            "https://files.minecraftforge.net/maven/net/minecraftforge/forge/\
             1.12.2-14.23.5.2768/forge-1.12.2-14.23.5.2768-installer.jar"
        );

        // Branch-qualified builds repeat the branch in both URL segments.
        let branched = index.number.get("1234").unwrap();
        let file = branched.installer_artifact().unwrap();
        assert_eq!(
            artifact_url(&index.artifact, branched, file),
            "https://files.minecraftforge.net/maven/net/minecraftforge/forge/\
             1.7.10-10.13.4.1234-special/forge-1.7.10-10.13.4.1234-special-INSTALLER.jar"
        );
    }
}
