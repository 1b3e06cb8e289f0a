use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the whole pipeline.
/// Every module returns `Result<T, PackError>`.
#[derive(Debug, Error)]
pub enum PackError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Redirect limit ({limit}) exceeded on url: {url}")]
    RedirectLimit { url: String, limit: usize },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Resolution ──────────────────────────────────────
    #[error("File no longer available on the content host (project {project_id}, file {file_id})")]
    FileUnavailable { project_id: u32, file_id: u32 },

    // ── Integrity ───────────────────────────────────────
    #[error("MD5 mismatch for {path:?}: expected {expected}, got {actual}")]
    Md5Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Manifest ────────────────────────────────────────
    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("Archive has no manifest entry ({0})")]
    ManifestMissing(String),

    // ── Loader ──────────────────────────────────────────
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Installer execution failed: {0}")]
    InstallerExec(String),

    // ── Input / Output paths ────────────────────────────
    #[error("Input path error: {0}")]
    InputPath(String),

    #[error("Output path error: {0}")]
    OutputPath(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type PackResult<T> = Result<T, PackError>;

impl PackError {
    /// Attach a path to a raw IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for PackError {
    fn from(source: std::io::Error) -> Self {
        PackError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
