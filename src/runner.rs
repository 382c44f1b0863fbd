use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::archive::ArtifactLayout;
use crate::config::Target;
use crate::error::TargetFailure;
use crate::fetch::SnapshotSource;
use crate::store::BaselineRepository;
use crate::verify::{self, ChangeReport, Verification};

#[derive(Debug, Clone)]
pub enum TargetStatus {
    Verified(ChangeReport),
    Failed { kind: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct TargetResult {
    pub target: Target,
    pub status: TargetStatus,
}

/// Per-target results in configuration order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<TargetResult>,
}

impl BatchSummary {
    pub fn changed(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Verified(r) if r.file_changed || r.spec_changed))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&TargetStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

type TaskResult = (usize, Result<Verification, TargetFailure>);

/// Verify all targets with at most `concurrency` in flight. Results flow
/// back over a channel and this loop is the only writer to `repo`.
pub async fn run_batch(
    source: Arc<dyn SnapshotSource>,
    layout: &ArtifactLayout,
    repo: &mut dyn BaselineRepository,
    targets: &[Target],
    concurrency: usize,
) -> Result<BatchSummary> {
    let baselines = repo.load_all()?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = targets.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<TaskResult>(concurrency.max(1) * 2);

    for (index, target) in targets.iter().enumerate() {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let layout = layout.clone();
        let target = target.clone();
        let previous = baselines.get(&target.url).cloned();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            info!(name = %target.name, url = %target.url, "verifying target");
            let result = verify::verify_target(
                source.as_ref(),
                &layout,
                &target,
                previous.as_ref(),
                Local::now(),
            )
            .await;
            let _ = tx.send((index, result)).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut statuses: Vec<Option<TargetStatus>> = vec![None; total];
    while let Some((index, result)) = rx.recv().await {
        let target = &targets[index];
        let status = match result {
            Ok(verification) => match repo.put(&target.url, &verification.record) {
                Ok(()) => {
                    info!(name = %target.name, outcome = %verification.report.outcome, "verification done");
                    TargetStatus::Verified(verification.report)
                }
                Err(e) => {
                    error!(name = %target.name, error = %e, "failed to store baseline");
                    TargetStatus::Failed {
                        kind: "StorageError",
                        message: format!("{:#}", e),
                    }
                }
            },
            Err(failure) => {
                error!(name = %target.name, error = %failure, "verification failed");
                TargetStatus::Failed {
                    kind: failure.error.kind(),
                    message: failure.to_string(),
                }
            }
        };
        statuses[index] = Some(status);
        pb.set_message(target.name.clone());
        pb.inc(1);
    }

    pb.finish_and_clear();
    repo.flush()?;

    let results: Vec<TargetResult> = targets
        .iter()
        .zip(statuses)
        .map(|(target, status)| TargetResult {
            target: target.clone(),
            status: status.unwrap_or_else(|| TargetStatus::Failed {
                kind: "Aborted",
                message: "verification task ended without a result".into(),
            }),
        })
        .collect();

    let summary = BatchSummary { results };
    info!(
        "Checked {} targets ({} changed, {} failed)",
        total,
        summary.changed(),
        summary.failed()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::compare::Outcome;
    use crate::error::ExtractionFailure;
    use crate::store::{BaselineRecord, JsonStore};
    use crate::verify::tests::{StubSource, PAGE, PDF};

    #[derive(Default)]
    struct MemoryStore {
        records: HashMap<String, BaselineRecord>,
        puts: usize,
        flushed: bool,
    }

    impl BaselineRepository for MemoryStore {
        fn load_all(&self) -> Result<HashMap<String, BaselineRecord>> {
            Ok(self.records.clone())
        }

        fn put(&mut self, url: &str, record: &BaselineRecord) -> Result<()> {
            self.puts += 1;
            self.records.insert(url.to_string(), record.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn target(name: &str, url: &str) -> Target {
        Target {
            name: name.into(),
            url: url.into(),
        }
    }

    fn layout(root: &std::path::Path) -> ArtifactLayout {
        let layout = ArtifactLayout::new(root.join("specs"), root.join("archive"), root.join("diffs"));
        layout.ensure_dirs().unwrap();
        layout
    }

    #[tokio::test]
    async fn failures_do_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let source = StubSource::default()
            .page("https://vendor.test/a", "no_datasheet")
            .page("https://vendor.test/b", "bad_specs_href")
            .page(PAGE, "sensor_v1")
            .artifact(PDF, b"pdf-v1");
        let targets = vec![
            target("A", "https://vendor.test/a"),
            target("B", "https://vendor.test/b"),
            target("TX-200", PAGE),
            target("Gone", "https://vendor.test/404"),
        ];
        let mut store = MemoryStore::default();

        let summary = run_batch(Arc::new(source), &layout(dir.path()), &mut store, &targets, 2)
            .await
            .unwrap();

        assert_eq!(summary.results.len(), 4);
        assert_eq!(summary.failed(), 3);
        let names: Vec<_> = summary.results.iter().map(|r| r.target.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "TX-200", "Gone"]);

        let messages: Vec<String> = summary.results[..2]
            .iter()
            .map(|r| match &r.status {
                TargetStatus::Failed { kind, message } => {
                    assert_eq!(*kind, "ExtractionError");
                    message.clone()
                }
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert!(messages[0].contains(&ExtractionFailure::DatasheetLinkNotFound.to_string()));
        assert!(messages[1].contains(&ExtractionFailure::SpecsHrefInvalid.to_string()));

        match &summary.results[2].status {
            TargetStatus::Verified(r) => assert_eq!(r.outcome, Outcome::InitialCapture),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            summary.results[3].status,
            TargetStatus::Failed { kind: "FetchError", .. }
        ));

        // only the successful target touches the store
        assert_eq!(store.puts, 1);
        assert!(store.records.contains_key(PAGE));
        assert!(store.flushed);
    }

    #[tokio::test]
    async fn failed_target_keeps_prior_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let path = dir.path().join("baselines.json");
        let targets = vec![target("TX-200", PAGE)];

        let good = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");
        let mut store = JsonStore::open(&path).unwrap();
        run_batch(Arc::new(good), &l, &mut store, &targets, 1).await.unwrap();
        let before = JsonStore::open(&path).unwrap().load_all().unwrap();

        let broken = StubSource::default().page(PAGE, "empty_specs");
        let mut store = JsonStore::open(&path).unwrap();
        let summary = run_batch(Arc::new(broken), &l, &mut store, &targets, 1).await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(JsonStore::open(&path).unwrap().load_all().unwrap(), before);
    }

    #[tokio::test]
    async fn second_batch_reports_spec_change() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let targets = vec![target("TX-200", PAGE)];
        let mut store = MemoryStore::default();

        let v1 = StubSource::default().page(PAGE, "sensor_v1").artifact(PDF, b"pdf-v1");
        run_batch(Arc::new(v1), &l, &mut store, &targets, 1).await.unwrap();

        let v2 = StubSource::default().page(PAGE, "sensor_v2").artifact(PDF, b"pdf-v1");
        let summary = run_batch(Arc::new(v2), &l, &mut store, &targets, 1).await.unwrap();

        assert_eq!(summary.changed(), 1);
        match &summary.results[0].status {
            TargetStatus::Verified(r) => {
                assert_eq!(r.outcome, Outcome::SpecChanged);
                assert!(r.diff_fragment.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
