// ─── URL Resolver ───
// Turns an abstract (project id, file id) reference into a concrete download
// URL via an ordered strategy chain: direct URL, metadata service, host
// redirect. First success wins; the metadata service is a soft fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::core::error::{PackError, PackResult};
use crate::core::http::{file_name_from_url, final_url};
use crate::core::manifest::ModReference;

/// Metadata mirror serving structured project/file records by id.
pub const DEFAULT_METADATA_BASE: &str = "https://cursemeta.dries007.net";
/// Canonical project pages on the content host; id URLs redirect to names.
pub const DEFAULT_PROJECT_BASE: &str = "https://minecraft.curseforge.com/projects";

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub url: String,
    pub project_name: String,
    pub file_name: String,
}

#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// `Ok(Some)` resolves the reference, `Ok(None)` falls through to the
    /// next strategy, `Err` fails the reference outright.
    async fn attempt(&self, reference: &ModReference) -> PackResult<Option<Resolution>>;
}

// ── Strategy 1: direct URL ──────────────────────────────

/// Uses a download URL the reference already carries, unmodified.
pub struct DirectUrl;

#[async_trait]
impl ResolveStrategy for DirectUrl {
    async fn attempt(&self, reference: &ModReference) -> PackResult<Option<Resolution>> {
        let Some(url) = &reference.download_url else {
            return Ok(None);
        };
        let Some(file_name) = file_name_from_url(url) else {
            debug!("Reference {} carries an unusable URL, falling through", reference.project_id);
            return Ok(None);
        };
        let project_name = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| file_name.clone());
        Ok(Some(Resolution {
            url: url.clone(),
            project_name,
            file_name,
        }))
    }
}

// ── Strategy 2: metadata service ────────────────────────

#[derive(Debug, Deserialize)]
struct ProjectRecord {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct FileRecord {
    #[serde(rename = "FileNameOnDisk")]
    file_name_on_disk: String,
    #[serde(rename = "DownloadURL")]
    download_url: String,
}

/// Looks the reference up on an external metadata mirror. Every failure here
/// is soft: the host-redirect strategy remains as the fallback.
pub struct MetadataService {
    client: Client,
    base: String,
}

impl MetadataService {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    async fn lookup(&self, reference: &ModReference) -> PackResult<Resolution> {
        let project: ProjectRecord = self
            .client
            .get(format!("{}/{}.json", self.base, reference.project_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let file: FileRecord = self
            .client
            .get(format!(
                "{}/{}/{}.json",
                self.base, reference.project_id, reference.file_id
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Resolution {
            url: encode_file_component(&file.download_url),
            project_name: project.name,
            file_name: file.file_name_on_disk,
        })
    }
}

#[async_trait]
impl ResolveStrategy for MetadataService {
    async fn attempt(&self, reference: &ModReference) -> PackResult<Option<Resolution>> {
        match self.lookup(reference).await {
            Ok(resolution) => Ok(Some(resolution)),
            Err(e) => {
                debug!(
                    "No metadata for {}:{} ({}), trying the content host",
                    reference.project_id, reference.file_id, e
                );
                Ok(None)
            }
        }
    }
}

// ── Strategy 3: host redirect ───────────────────────────

/// Resolves the project id to its canonical name by following the host's
/// redirects, then probes the download URL template the same way.
pub struct HostRedirect {
    bare_client: Client,
    base: String,
}

impl HostRedirect {
    pub fn new(bare_client: Client, base: impl Into<String>) -> Self {
        Self {
            bare_client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl ResolveStrategy for HostRedirect {
    async fn attempt(&self, reference: &ModReference) -> PackResult<Option<Resolution>> {
        let project_url = format!("{}/{}", self.base, reference.project_id);
        let final_project = final_url(&self.bare_client, &project_url).await?;
        let project_name = final_project
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let template = format!(
            "{}/{}/files/{}/download",
            self.base, project_name, reference.file_id
        );
        let resolved = final_url(&self.bare_client, &template).await?;
        ensure_redirected(&template, &resolved, reference)?;

        let file_name = file_name_from_url(&resolved).ok_or_else(|| PackError::InvalidUrl {
            url: resolved.clone(),
            reason: "no file name in resolved URL".to_string(),
        })?;

        Ok(Some(Resolution {
            url: resolved,
            project_name,
            file_name,
        }))
    }
}

/// A download template that resolves to itself never left the host: the file
/// is gone.
fn ensure_redirected(template: &str, resolved: &str, reference: &ModReference) -> PackResult<()> {
    if resolved == template {
        return Err(PackError::FileUnavailable {
            project_id: reference.project_id,
            file_id: reference.file_id,
        });
    }
    Ok(())
}

/// Percent-encode the file-name component of a raw download URL, leaving the
/// directory part untouched. Spaces end up as `%20`.
fn encode_file_component(raw: &str) -> String {
    match raw.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}", dir, urlencoding::encode(name)),
        None => raw.to_string(),
    }
}

// ── Dispatcher ──────────────────────────────────────────

/// Strategy dispatcher without `Box<dyn>`.
pub enum Strategy {
    Direct(DirectUrl),
    Metadata(MetadataService),
    Host(HostRedirect),
}

impl Strategy {
    async fn attempt(&self, reference: &ModReference) -> PackResult<Option<Resolution>> {
        match self {
            Strategy::Direct(s) => s.attempt(reference).await,
            Strategy::Metadata(s) => s.attempt(reference).await,
            Strategy::Host(s) => s.attempt(reference).await,
        }
    }
}

/// The ordered chain. Owned by the worker pool, shared by all workers.
pub struct Resolver {
    strategies: Vec<Strategy>,
}

impl Resolver {
    /// Chain with the default hosts. `use_metadata` controls whether the
    /// metadata service is consulted before the content host.
    pub fn new(client: Client, bare_client: Client, use_metadata: bool) -> Self {
        Self::with_bases(
            client,
            bare_client,
            use_metadata,
            DEFAULT_METADATA_BASE,
            DEFAULT_PROJECT_BASE,
        )
    }

    pub fn with_bases(
        client: Client,
        bare_client: Client,
        use_metadata: bool,
        metadata_base: &str,
        project_base: &str,
    ) -> Self {
        let mut strategies = vec![Strategy::Direct(DirectUrl)];
        if use_metadata {
            strategies.push(Strategy::Metadata(MetadataService::new(
                client,
                metadata_base,
            )));
        }
        strategies.push(Strategy::Host(HostRedirect::new(bare_client, project_base)));
        Self { strategies }
    }

    pub async fn resolve(&self, reference: &ModReference) -> PackResult<Resolution> {
        for strategy in &self.strategies {
            if let Some(resolution) = strategy.attempt(reference).await? {
                return Ok(resolution);
            }
        }
        Err(PackError::FileUnavailable {
            project_id: reference.project_id,
            file_id: reference.file_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(project_id: u32, file_id: u32) -> ModReference {
        serde_json::from_str(&format!(
            r#"{{ "projectID": {}, "fileID": {} }}"#,
            project_id, file_id
        ))
        .unwrap()
    }

    #[test]
    fn file_component_is_percent_encoded() {
        assert_eq!(
            encode_file_component("https://cdn.example.com/files/Some Mod [1.12].jar"),
            "https://cdn.example.com/files/Some%20Mod%20%5B1.12%5D.jar"
        );
        // Already-safe names pass through unchanged.
        assert_eq!(
            encode_file_component("https://cdn.example.com/files/mod-1.0.jar"),
            "https://cdn.example.com/files/mod-1.0.jar"
        );
    }

    #[test]
    fn unredirected_template_is_classified_unavailable() {
        let template = "https://minecraft.curseforge.com/projects/mod/files/456/download";
        let r = reference(123, 456);
        assert!(matches!(
            ensure_redirected(template, template, &r),
            Err(PackError::FileUnavailable {
                project_id: 123,
                file_id: 456,
            })
        ));
        assert!(ensure_redirected(template, "https://cdn.example.com/mod.jar", &r).is_ok());
    }

    #[tokio::test]
    async fn direct_url_wins_when_present() {
        let raw = r#"{
            "projectID": 1,
            "fileID": 2,
            "downloadUrl": "https://cdn.example.com/files/known-1.0.jar"
        }"#;
        let reference: ModReference = serde_json::from_str(raw).unwrap();
        let resolution = DirectUrl.attempt(&reference).await.unwrap().unwrap();
        assert_eq!(resolution.url, "https://cdn.example.com/files/known-1.0.jar");
        assert_eq!(resolution.file_name, "known-1.0.jar");
    }

    #[tokio::test]
    async fn direct_url_falls_through_when_absent() {
        let r = reference(1, 2);
        assert!(DirectUrl.attempt(&r).await.unwrap().is_none());
    }
}
