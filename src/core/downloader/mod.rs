// ─── Download Worker Pool ───
// N workers drain the reference list through a shared atomic cursor. Each
// claimed reference is resolved, streamed into the download staging
// directory, and classified success or failure. One failure never stops the
// pool; the shared failure list is inspected after all workers exit.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::core::error::{PackError, PackResult};
use crate::core::manifest::{Manifest, ModReference, ResolvedMod};
use crate::core::resolver::Resolver;

/// One reference that could not be resolved or transferred.
#[derive(Debug, Clone)]
pub struct FailedDownload {
    /// Position in the manifest's file list.
    pub index: usize,
    pub project_id: u32,
    pub file_id: u32,
    pub error: String,
}

/// First-error-wins slot for failures that must abort the run. Workers stop
/// claiming new work once it is set; in-flight transfers finish naturally.
#[derive(Clone, Default)]
pub struct FatalSlot {
    inner: Arc<Mutex<Option<PackError>>>,
}

impl FatalSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error unless one is already present.
    pub fn record(&self, error: PackError) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Remove and return the recorded error, if any.
    pub fn take(&self) -> Option<PackError> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PackError>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Concurrent downloader for the manifest's reference list.
pub struct DownloadPool {
    client: Client,
    resolver: Arc<Resolver>,
    download_dir: PathBuf,
    threads: usize,
}

impl DownloadPool {
    pub fn new(
        client: Client,
        resolver: Resolver,
        download_dir: PathBuf,
        threads: usize,
    ) -> Self {
        Self {
            client,
            resolver: Arc::new(resolver),
            download_dir,
            threads,
        }
    }

    /// Run the pool to completion and return the failure list. Worker panics
    /// are recorded into `fatal` after all workers have been joined.
    pub async fn run(&self, manifest: Arc<Manifest>, fatal: &FatalSlot) -> Vec<FailedDownload> {
        let total = manifest.files.len();
        // Excess workers would only ever claim an out-of-range index.
        let workers = self.threads.min(total);
        if workers == 0 {
            return Vec::new();
        }

        info!("Total mod count: {}", total);

        let counter = Arc::new(AtomicUsize::new(0));
        let failures: Arc<Mutex<Vec<FailedDownload>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let client = self.client.clone();
            let resolver = Arc::clone(&self.resolver);
            let manifest = Arc::clone(&manifest);
            let download_dir = self.download_dir.clone();
            let counter = Arc::clone(&counter);
            let failures = Arc::clone(&failures);
            let fatal = fatal.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(
                    &client,
                    &resolver,
                    &manifest,
                    &download_dir,
                    &counter,
                    &failures,
                    &fatal,
                )
                .await;
            }));
        }

        for handle in handles {
            if let Err(join_error) = handle.await {
                // A panic is a defect, not a download failure.
                fatal.record(PackError::Other(format!(
                    "download worker panicked: {join_error}"
                )));
            }
        }

        let collected = failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        collected
    }
}

async fn worker_loop(
    client: &Client,
    resolver: &Resolver,
    manifest: &Manifest,
    download_dir: &Path,
    counter: &AtomicUsize,
    failures: &Mutex<Vec<FailedDownload>>,
    fatal: &FatalSlot,
) {
    while !fatal.is_set() {
        let index = counter.fetch_add(1, Ordering::SeqCst);
        if index >= manifest.files.len() {
            break; // work done
        }
        let reference = &manifest.files[index];

        match process_reference(client, resolver, reference, download_dir).await {
            Ok(resolved) => {
                info!(
                    "Mod {:>3}: {:>10} {:>10} '{}' '{}' from {}",
                    index + 1,
                    reference.project_id,
                    reference.file_id,
                    resolved.project_name,
                    resolved.file_name,
                    resolved.url
                );
                reference.mark_resolved(resolved);
            }
            Err(error) => {
                warn!(
                    "Mod {:>3}: {:>10} {:>10} ERROR: {}",
                    index + 1,
                    reference.project_id,
                    reference.file_id,
                    error
                );
                failures
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(FailedDownload {
                        index,
                        project_id: reference.project_id,
                        file_id: reference.file_id,
                        error: error.to_string(),
                    });
            }
        }
    }
}

async fn process_reference(
    client: &Client,
    resolver: &Resolver,
    reference: &ModReference,
    download_dir: &Path,
) -> PackResult<ResolvedMod> {
    let resolution = resolver.resolve(reference).await?;
    let dest = download_dir.join(&resolution.file_name);
    download_to_file(client, &resolution.url, &dest).await?;
    Ok(ResolvedMod {
        project_name: resolution.project_name,
        file_name: resolution.file_name,
        url: resolution.url,
        path: dest,
    })
}

/// Stream a URL's body to a file. Always overwrites: staging directories are
/// fresh per run, so within-run collisions cannot occur.
pub async fn download_to_file(client: &Client, url: &str, dest: &Path) -> PackResult<()> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PackError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| PackError::io(dest, e))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| PackError::io(dest, e))?;
    }
    file.flush().await.map_err(|e| PackError::io(dest, e))?;

    Ok(())
}
