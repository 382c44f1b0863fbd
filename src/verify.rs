//! Per-target verification pipeline:
//! extract -> download -> fingerprint -> compare -> diff -> archive.

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::archive::{ArtifactLayout, Written};
use crate::compare::{self, Fingerprints, Outcome};
use crate::config::Target;
use crate::diff;
use crate::error::TargetFailure;
use crate::fetch::{FetchedSnapshot, SnapshotSource};
use crate::fingerprint::fingerprint;
use crate::store::{self, BaselineRecord};

/// What changed for a target, for the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub outcome: Outcome,
    pub file_changed: bool,
    pub spec_changed: bool,
    pub diff_fragment: Option<String>,
    pub narrative: String,
}

#[derive(Debug, Clone)]
pub struct Verification {
    /// Record the caller should store for the target.
    pub record: BaselineRecord,
    pub report: ChangeReport,
    pub written: Written,
}

/// Run the full pipeline for one target. Any error leaves the previous
/// record as the one to keep.
pub async fn verify_target(
    source: &dyn SnapshotSource,
    layout: &ArtifactLayout,
    target: &Target,
    previous: Option<&BaselineRecord>,
    now: DateTime<Local>,
) -> Result<Verification, TargetFailure> {
    let fail = |e| TargetFailure::new(&target.name, &target.url, e);

    let previous_spec = layout.read_previous_spec(target).map_err(fail)?;
    let snapshot = source.fetch_snapshot(&target.url).await.map_err(fail)?;
    info!(name = %target.name, download = %snapshot.download_url, "datasheet link found");

    apply_snapshot(layout, target, previous, &previous_spec, &snapshot, now)
}

/// Fingerprint, classify and persist an already fetched snapshot.
pub fn apply_snapshot(
    layout: &ArtifactLayout,
    target: &Target,
    previous: Option<&BaselineRecord>,
    previous_spec: &str,
    snapshot: &FetchedSnapshot,
    now: DateTime<Local>,
) -> Result<Verification, TargetFailure> {
    let current = Fingerprints {
        file_hash: fingerprint(&snapshot.file_bytes),
        html_hash: fingerprint(snapshot.spec_html.as_bytes()),
    };
    info!(
        name = %target.name,
        file_hash = %current.file_hash,
        html_hash = %current.html_hash,
        "fingerprinted"
    );

    let outcome = compare::classify(&store::baseline_of(previous), &current);
    match outcome {
        Outcome::InitialCapture => info!(name = %target.name, "first verification, capturing initial state"),
        Outcome::Unchanged => info!(name = %target.name, "no changes"),
        _ => warn!(
            name = %target.name,
            file_changed = outcome.file_changed(),
            spec_changed = outcome.spec_changed(),
            "change detected"
        ),
    }

    let diff_fragment = outcome
        .spec_changed()
        .then(|| diff::render_fragment(previous_spec, &snapshot.spec_html));

    let written = layout
        .persist(target, outcome, snapshot, diff_fragment.as_deref(), &now)
        .map_err(|e| TargetFailure::new(&target.name, &target.url, e))?;

    let record = BaselineRecord {
        resolved_download_url: snapshot.download_url.clone(),
        file_hash: current.file_hash,
        html_hash: current.html_hash,
        last_checked_at: now.fixed_offset(),
    };
    let report = ChangeReport {
        outcome,
        file_changed: outcome.file_changed(),
        spec_changed: outcome.spec_changed(),
        diff_fragment,
        narrative: outcome.narrative(),
    };

    Ok(Verification {
        record,
        report,
        written,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use url::Url;

    use super::*;
    use crate::error::{ExtractionFailure, MonitorError};
    use crate::extract;
    use crate::fetch::{snapshot_from, Artifact};

    /// Serves fixture pages and artifacts from memory.
    #[derive(Default)]
    pub(crate) struct StubSource {
        pub pages: HashMap<String, String>,
        pub artifacts: HashMap<String, Vec<u8>>,
    }

    impl StubSource {
        pub fn page(mut self, url: &str, fixture: &str) -> Self {
            let html = fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
            self.pages.insert(url.to_string(), html);
            self
        }

        pub fn artifact(mut self, url: &str, bytes: &[u8]) -> Self {
            self.artifacts.insert(url.to_string(), bytes.to_vec());
            self
        }
    }

    #[async_trait]
    impl SnapshotSource for StubSource {
        async fn fetch_snapshot(&self, page_url: &str) -> Result<FetchedSnapshot, MonitorError> {
            let html = self.pages.get(page_url).ok_or(MonitorError::Status {
                url: page_url.to_string(),
                status: 404,
            })?;
            let page = extract::extract_page(&Url::parse(page_url).unwrap(), html)?;
            let bytes = self
                .artifacts
                .get(&page.download_url)
                .ok_or(MonitorError::Status {
                    url: page.download_url.clone(),
                    status: 404,
                })?
                .clone();
            let artifact = Artifact {
                bytes,
                filename: "tx200.pdf".into(),
            };
            Ok(snapshot_from(page, artifact))
        }
    }

    pub(crate) const PAGE: &str = "https://vendor.test/products/tx200";
    pub(crate) const PDF: &str = "https://vendor.test/downloads/tx200-datasheet.pdf";

    fn target() -> Target {
        Target {
            name: "TX-200".into(),
            url: PAGE.into(),
        }
    }

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 5, 2, hour, 0, 0).unwrap()
    }

    fn layout(root: &Path) -> ArtifactLayout {
        let layout = ArtifactLayout::new(root.join("specs"), root.join("archive"), root.join("diffs"));
        layout.ensure_dirs().unwrap();
        layout
    }

    fn files(layout: &ArtifactLayout) -> usize {
        [&layout.specs_dir, &layout.archive_dir, &layout.diff_dir]
            .iter()
            .map(|d| fs::read_dir(d).unwrap().count())
            .sum()
    }

    async fn run(
        source: &StubSource,
        layout: &ArtifactLayout,
        previous: Option<&BaselineRecord>,
        hour: u32,
    ) -> Result<Verification, TargetFailure> {
        verify_target(source, layout, &target(), previous, at(hour)).await
    }

    #[tokio::test]
    async fn first_run_captures_without_reporting_change() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let source = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");

        let v = run(&source, &l, None, 8).await.unwrap();
        assert_eq!(v.report.outcome, Outcome::InitialCapture);
        assert!(!v.report.file_changed && !v.report.spec_changed);
        assert!(v.report.diff_fragment.is_none());
        assert!(v.report.narrative.contains("Initial state captured"));
        assert!(l.latest_spec_path(&target()).exists());
        assert_eq!(v.record.resolved_download_url, PDF);
        assert_eq!(v.record.last_checked_at, at(8).fixed_offset());
    }

    #[tokio::test]
    async fn rerun_without_change_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let source = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");

        let first = run(&source, &l, None, 8).await.unwrap();
        let before = files(&l);
        let second = run(&source, &l, Some(&first.record), 9).await.unwrap();

        assert_eq!(second.report.outcome, Outcome::Unchanged);
        assert_eq!(second.report.narrative, "No changes detected.");
        assert_eq!(files(&l), before);
        assert_eq!(second.record.file_hash, first.record.file_hash);
        assert_eq!(second.record.last_checked_at, at(9).fixed_offset());
    }

    #[tokio::test]
    async fn whitespace_only_page_churn_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let v1 = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");
        let ws = StubSource::default().page(PAGE, "sensor_whitespace").artifact(PDF, b"pdf-v1");

        let first = run(&v1, &l, None, 8).await.unwrap();
        let second = run(&ws, &l, Some(&first.record), 9).await.unwrap();
        assert_eq!(second.report.outcome, Outcome::Unchanged);
    }

    #[tokio::test]
    async fn spec_only_change_is_spec_changed() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let v1 = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");
        let v2 = StubSource::default().page(PAGE, "sensor_v2").artifact(PDF, b"pdf-v1");

        let first = run(&v1, &l, None, 8).await.unwrap();
        let old_spec = fs::read_to_string(l.latest_spec_path(&target())).unwrap();
        let second = run(&v2, &l, Some(&first.record), 9).await.unwrap();

        assert_eq!(second.report.outcome, Outcome::SpecChanged);
        assert!(!second.report.file_changed);
        assert_eq!(second.record.file_hash, first.record.file_hash);
        assert_ne!(second.record.html_hash, first.record.html_hash);

        let fragment = second.report.diff_fragment.as_deref().unwrap();
        assert!(fragment.contains("<ins>"));
        let report = fs::read_to_string(second.written.diff_report.unwrap()).unwrap();
        assert!(report.contains(fragment));

        let new_spec = fs::read_to_string(l.latest_spec_path(&target())).unwrap();
        assert_ne!(new_spec, old_spec);
        assert!(new_spec.contains("3.3 V"));
    }

    #[tokio::test]
    async fn file_only_change_is_file_changed() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let v1 = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");
        let v2 = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v2");

        let first = run(&v1, &l, None, 8).await.unwrap();
        let second = run(&v2, &l, Some(&first.record), 9).await.unwrap();

        assert_eq!(second.report.outcome, Outcome::FileChanged);
        assert!(second.report.diff_fragment.is_none());
        assert!(second.written.diff_report.is_none());
        assert_eq!(second.record.html_hash, first.record.html_hash);
        assert_eq!(fs::read_dir(&l.diff_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stored_hashes_drive_classification() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let source = StubSource::default().page(PAGE, "sensor_v2").artifact(PDF, b"A-bytes");
        let current_file = fingerprint(b"A-bytes");
        let stored = BaselineRecord {
            resolved_download_url: PDF.into(),
            file_hash: current_file.clone(),
            html_hash: "B".into(),
            last_checked_at: at(1).fixed_offset(),
        };

        let v = run(&source, &l, Some(&stored), 9).await.unwrap();
        assert_eq!(v.report.outcome, Outcome::SpecChanged);
        assert!(v.written.diff_report.is_some());
        assert!(v.written.latest_spec.is_some());
        assert_eq!(v.record.file_hash, current_file);
        assert_ne!(v.record.html_hash, "B");
        assert_eq!(v.record.last_checked_at, at(9).fixed_offset());
    }

    #[tokio::test]
    async fn targets_with_colliding_names_keep_their_own_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let other_page = "https://vendor.test/products/tx200-b";
        let source = StubSource::default()
            .page(PAGE, "sensor_v1")
            .page(other_page, "sensor_v2")
            .artifact(PDF, b"pdf-v1");
        let spaced = Target {
            name: "TX 200".into(),
            url: PAGE.into(),
        };
        let slashed = Target {
            name: "TX/200".into(),
            url: other_page.into(),
        };

        verify_target(&source, &l, &spaced, None, at(8)).await.unwrap();
        verify_target(&source, &l, &slashed, None, at(8)).await.unwrap();

        let a = fs::read_to_string(l.latest_spec_path(&spaced)).unwrap();
        let b = fs::read_to_string(l.latest_spec_path(&slashed)).unwrap();
        assert!(a.contains("<td>5 V</td>"));
        assert!(b.contains("3.3 V"));
    }

    #[tokio::test]
    async fn extraction_failure_names_target() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let source = StubSource::default().page(PAGE, "no_datasheet");

        let err = run(&source, &l, None, 8).await.unwrap_err();
        assert_eq!(err.target, "TX-200");
        assert_eq!(err.url, PAGE);
        assert_eq!(
            err.error.extraction_failure(),
            Some(ExtractionFailure::DatasheetLinkNotFound)
        );
        assert_eq!(files(&l), 0);
    }

    #[tokio::test]
    async fn unwritable_baseline_fails_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut l = layout(dir.path());
        l.specs_dir = dir.path().join("absent");
        let source = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");

        let err = run(&source, &l, None, 8).await.unwrap_err();
        assert_eq!(err.error.kind(), "StorageError");
    }
}
