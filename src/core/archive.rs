// ─── Archive ───
// The zip capability: single-entry reads, plus background extraction and
// compression with pollable progress. The zip work itself is synchronous and
// runs under spawn_blocking; callers observe a shared progress state.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::error::{PackError, PackResult};

/// How often waiters re-check a background operation's state.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How often the progress logger prints.
const LOG_INTERVAL: Duration = Duration::from_millis(250);

/// Read one named entry's bytes without touching the rest of the archive.
pub fn read_entry(archive_path: &Path, entry: &str) -> PackResult<Vec<u8>> {
    let file = File::open(archive_path).map_err(|e| PackError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry_file = archive.by_name(entry)?;
    let mut bytes = Vec::with_capacity(entry_file.size() as usize);
    std::io::copy(&mut entry_file, &mut bytes).map_err(|e| PackError::io(archive_path, e))?;
    Ok(bytes)
}

/// Entry-count progress of a background archive operation.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicU64,
    done: AtomicU64,
    finished: AtomicBool,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return if self.is_finished() { 100 } else { 0 };
        }
        (self.done.load(Ordering::Relaxed) * 100 / total) as u8
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn advance(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// A background archive operation. Progress is pollable while it runs;
/// `wait` surfaces the terminal result.
pub struct ArchiveTask {
    progress: Arc<Progress>,
    handle: tokio::task::JoinHandle<PackResult<()>>,
}

impl ArchiveTask {
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Poll until the operation completes, then return its result.
    pub async fn wait(self) -> PackResult<()> {
        while !self.progress.is_finished() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) => Err(PackError::Other(format!(
                "archive task panicked: {join_error}"
            ))),
        }
    }
}

fn spawn_archive_task<F>(work: F) -> ArchiveTask
where
    F: FnOnce(&Progress) -> PackResult<()> + Send + 'static,
{
    let progress = Arc::new(Progress::default());
    let task_progress = Arc::clone(&progress);
    let handle = tokio::task::spawn_blocking(move || {
        let result = work(&task_progress);
        task_progress.finish();
        result
    });
    ArchiveTask { progress, handle }
}

/// Extract every entry of `archive_path` under `dest` in the background.
pub fn extract_all(archive_path: &Path, dest: &Path) -> ArchiveTask {
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();
    spawn_archive_task(move |progress| extract_all_blocking(&archive_path, &dest, progress))
}

fn extract_all_blocking(archive_path: &Path, dest: &Path, progress: &Progress) -> PackResult<()> {
    let file = File::open(archive_path).map_err(|e| PackError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;
    progress.total.store(archive.len() as u64, Ordering::Relaxed);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        // Entries escaping the destination are skipped, not extracted.
        let Some(relative) = entry.enclosed_name() else {
            progress.advance();
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| PackError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
            }
            let mut out = File::create(&target).map_err(|e| PackError::io(&target, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| PackError::io(&target, e))?;
        }
        progress.advance();
    }

    Ok(())
}

/// Compress the contents of `src` into `dest_zip` in the background,
/// replacing any pre-existing file. With `wrap_root` the whole tree is
/// placed under one named root entry.
pub fn compress_dir(src: &Path, dest_zip: &Path, wrap_root: Option<String>) -> ArchiveTask {
    let src = src.to_path_buf();
    let dest_zip = dest_zip.to_path_buf();
    spawn_archive_task(move |progress| {
        compress_dir_blocking(&src, &dest_zip, wrap_root.as_deref(), progress)
    })
}

fn compress_dir_blocking(
    src: &Path,
    dest_zip: &Path,
    wrap_root: Option<&str>,
    progress: &Progress,
) -> PackResult<()> {
    let mut entries = Vec::new();
    collect_entries(src, Path::new(""), &mut entries)?;
    progress.total.store(entries.len() as u64, Ordering::Relaxed);

    let file = File::create(dest_zip).map_err(|e| PackError::io(dest_zip, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (absolute, relative, is_dir) in entries {
        let mut name = relative.to_string_lossy().replace('\\', "/");
        if let Some(root) = wrap_root {
            name = format!("{}/{}", root, name);
        }

        if is_dir {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut source = File::open(&absolute).map_err(|e| PackError::io(&absolute, e))?;
            std::io::copy(&mut source, &mut writer).map_err(|e| PackError::io(&absolute, e))?;
        }
        progress.advance();
    }

    writer.finish()?;
    Ok(())
}

fn collect_entries(
    dir: &Path,
    relative: &Path,
    entries: &mut Vec<(PathBuf, PathBuf, bool)>,
) -> PackResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| PackError::io(dir, e))? {
        let entry = entry.map_err(|e| PackError::io(dir, e))?;
        let absolute = entry.path();
        let child_relative = relative.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| PackError::io(&absolute, e))?;

        if file_type.is_dir() {
            entries.push((absolute.clone(), child_relative.clone(), true));
            collect_entries(&absolute, &child_relative, entries)?;
        } else if file_type.is_file() {
            entries.push((absolute, child_relative, false));
        }
    }
    Ok(())
}

/// Periodically log percent-done for a labeled operation until it finishes.
pub fn spawn_progress_logger(progress: Arc<Progress>, label: &'static str) {
    tokio::spawn(async move {
        let mut last_logged = None;
        while !progress.is_finished() {
            let percent = progress.percent();
            if last_logged != Some(percent) {
                info!("{}: {}%", label, percent);
                last_logged = Some(percent);
            }
            tokio::time::sleep(LOG_INTERVAL).await;
        }
        info!("{}: done", label);
    });
}
