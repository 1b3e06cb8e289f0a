// ─── Report ───
// The run's user-visible summary. Partial failure must stay visible even in
// quiet mode, so this prints to stdout instead of the tracing log.

use crate::core::downloader::FailedDownload;
use crate::core::loader::{LoaderOutcome, LoaderStatus};

/// Structured result of a completed run.
#[derive(Debug)]
pub struct JobReport {
    pub pack_name: String,
    /// `None` when loader handling was disabled for the run.
    pub loader: Option<LoaderOutcome>,
    pub failed_downloads: Vec<FailedDownload>,
}

impl JobReport {
    /// True when nothing needs manual follow-up.
    pub fn is_clean(&self) -> bool {
        self.failed_downloads.is_empty() && !self.loader_needs_attention()
    }

    fn loader_needs_attention(&self) -> bool {
        match &self.loader {
            None => false,
            Some(outcome) => {
                !outcome.unsupported.is_empty()
                    || matches!(outcome.status, LoaderStatus::Degraded { .. })
            }
        }
    }

    /// Two-section summary: loader status, then download status.
    pub fn print(&self) {
        match &self.loader {
            None => println!("MODLOADERS SKIPPED"),
            Some(_) if !self.loader_needs_attention() => println!("MODLOADERS OK"),
            Some(outcome) => {
                println!("MODLOADERS MISSING (install manually):");
                if let LoaderStatus::Degraded { declared, reason } = &outcome.status {
                    println!("    forge-{} ({})", declared, reason);
                }
                for id in &outcome.unsupported {
                    println!("    {}", id);
                }
            }
        }

        if self.failed_downloads.is_empty() {
            println!("DOWNLOADS OK");
        } else {
            println!("DOWNLOADS MISSING:");
            for failed in &self.failed_downloads {
                println!(
                    "    project {:>10} file {:>10}: {}",
                    failed.project_id, failed.file_id, failed.error
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: LoaderStatus, unsupported: Vec<String>) -> LoaderOutcome {
        LoaderOutcome {
            status,
            resolved_build: None,
            unsupported,
        }
    }

    #[test]
    fn clean_runs_have_no_follow_up() {
        let report = JobReport {
            pack_name: "pack".to_string(),
            loader: Some(outcome(LoaderStatus::Installed, Vec::new())),
            failed_downloads: Vec::new(),
        };
        assert!(report.is_clean());

        let report = JobReport {
            pack_name: "pack".to_string(),
            loader: None,
            failed_downloads: Vec::new(),
        };
        assert!(report.is_clean());
    }

    #[test]
    fn degraded_loader_or_failures_need_attention() {
        let report = JobReport {
            pack_name: "pack".to_string(),
            loader: Some(outcome(
                LoaderStatus::Degraded {
                    declared: "14.23.5.2768".to_string(),
                    reason: "index unavailable".to_string(),
                },
                Vec::new(),
            )),
            failed_downloads: Vec::new(),
        };
        assert!(!report.is_clean());

        let report = JobReport {
            pack_name: "pack".to_string(),
            loader: Some(outcome(
                LoaderStatus::NotNeeded,
                vec!["fabric-0.14.9".to_string()],
            )),
            failed_downloads: Vec::new(),
        };
        assert!(!report.is_clean());

        let report = JobReport {
            pack_name: "pack".to_string(),
            loader: None,
            failed_downloads: vec![FailedDownload {
                index: 0,
                project_id: 1,
                file_id: 2,
                error: "gone".to_string(),
            }],
        };
        assert!(!report.is_clean());
    }
}
