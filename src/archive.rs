use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::compare::Outcome;
use crate::diff;
use crate::config::Target;
use crate::error::MonitorError;
use crate::fetch::FetchedSnapshot;
use crate::fingerprint::fingerprint;

const URL_KEY_LEN: usize = 8;

/// Where a run's artifacts live on disk.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub specs_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub diff_dir: PathBuf,
}

/// Paths written by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Written {
    pub latest_spec: Option<PathBuf>,
    pub archived_file: Option<PathBuf>,
    pub diff_report: Option<PathBuf>,
    /// Secondary writes that failed and were skipped.
    pub warnings: Vec<String>,
}

impl ArtifactLayout {
    pub fn new(specs_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>, diff_dir: impl Into<PathBuf>) -> Self {
        Self {
            specs_dir: specs_dir.into(),
            archive_dir: archive_dir.into(),
            diff_dir: diff_dir.into(),
        }
    }

    /// Create output directories. Safe to call repeatedly.
    pub fn ensure_dirs(&self) -> Result<(), MonitorError> {
        for dir in [&self.specs_dir, &self.archive_dir, &self.diff_dir] {
            fs::create_dir_all(dir).map_err(|e| MonitorError::storage(dir, e))?;
        }
        Ok(())
    }

    pub fn latest_spec_path(&self, target: &Target) -> PathBuf {
        self.specs_dir
            .join(format!("{}_latest_specs.html", artifact_stem(target)))
    }

    pub fn archive_path(&self, target: &Target, filename: &str, now: &DateTime<Local>) -> PathBuf {
        self.archive_dir.join(format!(
            "{}_{}_{}",
            now.format("%Y-%m-%d"),
            artifact_stem(target),
            sanitize_name(filename)
        ))
    }

    pub fn diff_report_path(&self, target: &Target, now: &DateTime<Local>) -> PathBuf {
        self.diff_dir.join(format!(
            "{}_{}_diff.html",
            now.format("%Y-%m-%d_%H-%M-%S"),
            artifact_stem(target)
        ))
    }

    /// Previous normalized fragment; empty when never written.
    pub fn read_previous_spec(&self, target: &Target) -> Result<String, MonitorError> {
        let path = self.latest_spec_path(target);
        match fs::read_to_string(&path) {
            Ok(html) => Ok(html),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(MonitorError::storage(path, e)),
        }
    }

    /// Apply the archival policy for one classified run.
    ///
    /// Unchanged runs write nothing. Otherwise the latest spec artifact is
    /// overwritten first and its failure aborts the run; the archive copy
    /// and the diff report (written only when a fragment is given) are best
    /// effort.
    pub fn persist(
        &self,
        target: &Target,
        outcome: Outcome,
        snapshot: &FetchedSnapshot,
        diff_fragment: Option<&str>,
        now: &DateTime<Local>,
    ) -> Result<Written, MonitorError> {
        let mut written = Written::default();
        if !outcome.needs_persist() {
            return Ok(written);
        }

        let target_name = target.name.as_str();
        let latest = self.latest_spec_path(target);
        write_atomic(&latest, snapshot.spec_html.as_bytes())
            .map_err(|e| MonitorError::storage(&latest, e))?;
        info!(name = target_name, path = %latest.display(), "saved latest specs");
        written.latest_spec = Some(latest);

        if !snapshot.suggested_filename.is_empty() {
            let path = self.archive_path(target, &snapshot.suggested_filename, now);
            match fs::write(&path, &snapshot.file_bytes) {
                Ok(()) => {
                    info!(name = target_name, path = %path.display(), "archived datasheet");
                    written.archived_file = Some(path);
                }
                Err(e) => {
                    warn!(name = target_name, path = %path.display(), error = %e, "failed to archive datasheet");
                    written.warnings.push(format!("archive {}: {}", path.display(), e));
                }
            }
        }

        if let Some(fragment) = diff_fragment {
            let path = self.diff_report_path(target, now);
            let report = diff::render_report(fragment, target_name);
            match fs::write(&path, report) {
                Ok(()) => {
                    info!(name = target_name, path = %path.display(), "saved diff report");
                    written.diff_report = Some(path);
                }
                Err(e) => {
                    warn!(name = target_name, path = %path.display(), error = %e, "failed to save diff report");
                    written.warnings.push(format!("diff report {}: {}", path.display(), e));
                }
            }
        }

        Ok(written)
    }
}

/// Write via a sibling temp file so a failed write never leaves a torn baseline.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("html.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

/// Per-target file name prefix: the sanitized name plus a short key derived
/// from the target URL, so names that sanitize alike stay apart.
fn artifact_stem(target: &Target) -> String {
    let key = fingerprint(target.url.as_bytes());
    format!("{}_{}", sanitize_name(&target.name), &key[..URL_KEY_LEN])
}

/// Make a target or file name safe for use as a path component.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ' ' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            '"' => '\'',
            c => c,
        })
        .collect()
}
