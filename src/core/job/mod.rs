// ─── Job Orchestrator ───
// The top-level state machine: validate preconditions, stage the input,
// parse the manifest, then run archive extraction, the download pool, and
// mod-loader resolution concurrently. Output assembly starts only after all
// three have finished; the first fatal error wins.

pub mod output;
pub mod report;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::core::archive;
use crate::core::config::PackConfig;
use crate::core::downloader::{download_to_file, DownloadPool, FatalSlot};
use crate::core::error::{PackError, PackResult};
use crate::core::http::{build_bare_client, build_http_client, file_name_from_url, final_url};
use crate::core::loader::LoaderResolver;
use crate::core::manifest::{parse_manifest, validate_schema, MANIFEST_ENTRY};
use crate::core::resolver::Resolver;
use crate::core::staging::Staging;

use output::OutputAssembler;
use report::JobReport;

/// Run one modpack job to completion.
pub async fn run(config: &PackConfig) -> PackResult<JobReport> {
    if config.threads < 1 {
        return Err(PackError::Other(
            "at least one download worker is required".to_string(),
        ));
    }

    // Preflight: destination problems must surface before any extraction
    // or network traffic.
    let target = config.validate_output()?;

    let staging = Staging::create(&config.tmp, config.keep_tmp)?;
    let client = build_http_client()?;
    let bare_client = build_bare_client()?;

    let input = stage_input(config, &staging, &client, &bare_client).await?;

    // Manifest first: one cheap entry read unblocks parsing while the rest
    // of the archive extracts in the background.
    let manifest_raw = read_manifest_entry(&input)?;
    validate_schema(&manifest_raw)?;

    let extraction = archive::extract_all(&input, &staging.unzip_dir());
    if !config.quiet {
        archive::spawn_progress_logger(extraction.progress(), "Unzipping");
    }

    let manifest = Arc::new(parse_manifest(&manifest_raw)?);
    let pack_name = config
        .name
        .clone()
        .unwrap_or_else(|| manifest.name.clone());

    let fatal = FatalSlot::new();
    let resolver = Resolver::new(client.clone(), bare_client.clone(), config.remote_metadata);
    let pool = DownloadPool::new(
        client.clone(),
        resolver,
        staging.download_dir(),
        config.threads,
    );

    let out_dir = staging.out_dir();
    let loader_future = async {
        if config.no_loader {
            return None;
        }
        match LoaderResolver::new(config, &client, &out_dir)
            .run(&manifest)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                // Stops workers from claiming new references.
                fatal.record(error);
                None
            }
        }
    };

    let (failed_downloads, loader, extraction_result) = tokio::join!(
        pool.run(Arc::clone(&manifest), &fatal),
        loader_future,
        extraction.wait(),
    );

    if let Some(error) = fatal.take() {
        return Err(error);
    }
    extraction_result?;

    let assembler = OutputAssembler::new(config, &staging);
    assembler.assemble(&manifest, loader.as_ref(), &pack_name)?;
    assembler.materialize(&target, &pack_name).await?;

    info!("Pack '{}' materialized at {}", pack_name, config.output.display());

    Ok(JobReport {
        pack_name,
        loader,
        failed_downloads,
    })
}

/// Resolve the input argument to a local archive path, downloading it into
/// the staging root when it is a URL.
async fn stage_input(
    config: &PackConfig,
    staging: &Staging,
    client: &reqwest::Client,
    bare_client: &reqwest::Client,
) -> PackResult<PathBuf> {
    let is_url = Url::parse(&config.input)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false);

    if !is_url {
        let path = PathBuf::from(&config.input);
        if !path.is_file() {
            return Err(PackError::InputPath(format!(
                "input file {} does not exist",
                path.display()
            )));
        }
        return Ok(path);
    }

    let resolved = final_url(bare_client, &config.input).await?;
    let file_name =
        file_name_from_url(&resolved).filter(|name| name.to_lowercase().ends_with(".zip"));
    let Some(file_name) = file_name else {
        return Err(PackError::InputPath(format!(
            "input URL does not lead to a zip file: {resolved}"
        )));
    };

    info!("Downloading pack from URL: {}", resolved);
    let dest = staging.root().join(file_name);
    download_to_file(client, &resolved, &dest).await?;
    Ok(dest)
}

fn read_manifest_entry(input: &std::path::Path) -> PackResult<String> {
    let bytes = archive::read_entry(input, MANIFEST_ENTRY).map_err(|error| match error {
        PackError::Zip(zip::result::ZipError::FileNotFound) => {
            PackError::ManifestMissing(MANIFEST_ENTRY.to_string())
        }
        other => other,
    })?;
    String::from_utf8(bytes)
        .map_err(|e| PackError::ManifestInvalid(format!("manifest is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Side;
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_pack_zip(path: &Path, manifest: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file("manifest.json", options).unwrap();
        writer.write_all(manifest.as_bytes()).unwrap();
        writer.add_directory("overrides", options).unwrap();
        writer.start_file("overrides/server.properties", options).unwrap();
        writer.write_all(b"motd=packed").unwrap();
        writer.finish().unwrap();
    }

    fn config(input: &Path, output: PathBuf, tmp: &Path) -> PackConfig {
        PackConfig {
            input: input.to_string_lossy().to_string(),
            output,
            side: Side::Server { eula: false },
            threads: 2,
            quiet: true,
            tmp: tmp.to_path_buf(),
            no_loader: true,
            keep_tmp: false,
            root_zip: false,
            name: None,
            remote_metadata: false,
            delete_existing: false,
            overwrite: false,
        }
    }

    const EMPTY_PACK: &str = r#"{
        "minecraft": { "version": "1.12.2", "modLoaders": [] },
        "manifestType": "minecraftModpack",
        "manifestVersion": 1,
        "name": "Offline Pack",
        "files": [],
        "overrides": "overrides"
    }"#;

    #[tokio::test]
    async fn empty_pack_runs_end_to_end_without_network() {
        let tmp = tempfile::tempdir().unwrap();
        let pack = tmp.path().join("pack.zip");
        build_pack_zip(&pack, EMPTY_PACK);

        let dest = tmp.path().join("server");
        let cfg = config(&pack, dest.clone(), tmp.path());
        let report = run(&cfg).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.pack_name, "Offline Pack");
        assert!(dest.join("mods").is_dir());
        assert_eq!(
            std::fs::read_to_string(dest.join("server.properties")).unwrap(),
            "motd=packed"
        );
        // Staging is cleaned up on drop.
        assert!(!tmp.path().join("packdl_0").exists());
    }

    #[tokio::test]
    async fn schema_mismatch_aborts_before_any_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let pack = tmp.path().join("pack.zip");
        build_pack_zip(
            &pack,
            &EMPTY_PACK.replace("\"manifestVersion\": 1", "\"manifestVersion\": 3"),
        );

        let dest = tmp.path().join("server");
        let cfg = config(&pack, dest.clone(), tmp.path());
        let result = run(&cfg).await;
        assert!(matches!(result, Err(PackError::ManifestInvalid(_))));
        // No extraction happened: nothing was written past the staging root.
        assert!(!dest.join("server.properties").exists());
    }

    #[tokio::test]
    async fn missing_manifest_entry_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let pack = tmp.path().join("pack.zip");
        let file = std::fs::File::create(&pack).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("not-a-manifest.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nope").unwrap();
        writer.finish().unwrap();

        let cfg = config(&pack, tmp.path().join("server"), tmp.path());
        assert!(matches!(
            run(&cfg).await,
            Err(PackError::ManifestMissing(_))
        ));
    }

    #[tokio::test]
    async fn occupied_destination_fails_before_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let pack = tmp.path().join("pack.zip");
        build_pack_zip(&pack, EMPTY_PACK);

        let dest = tmp.path().join("server");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), b"keep").unwrap();

        let cfg = config(&pack, dest.clone(), tmp.path());
        assert!(matches!(run(&cfg).await, Err(PackError::OutputPath(_))));
        // The fast failure happened before staging was even created.
        assert!(!tmp.path().join("packdl_0").exists());
    }

    #[tokio::test]
    async fn conflicting_loader_declarations_are_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let pack = tmp.path().join("pack.zip");
        build_pack_zip(
            &pack,
            &EMPTY_PACK.replace(
                r#""modLoaders": []"#,
                r#""modLoaders": [
                    { "id": "forge-14.23.5.2768", "primary": true },
                    { "id": "forge-latest" }
                ]"#,
            ),
        );

        let mut cfg = config(&pack, tmp.path().join("server"), tmp.path());
        cfg.no_loader = false;
        assert!(matches!(
            run(&cfg).await,
            Err(PackError::ManifestInvalid(_))
        ));
    }

    #[tokio::test]
    async fn missing_input_is_reported_as_such() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(
            &tmp.path().join("nope.zip"),
            tmp.path().join("server"),
            tmp.path(),
        );
        assert!(matches!(run(&cfg).await, Err(PackError::InputPath(_))));
    }
}
