//! BuildRunner behaviour: numbering, terminal status and reconciliation order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drydock_core::fakes::{project, RecordingStatusReporter, ScriptedExecutor};
use drydock_core::{
    BuildRunner, BuildStatus, BuildStore, CommitId, ProjectId, ReportError, RunnerError,
    StatusReporter,
};
use drydock_state::fakes::MemoryBuildStore;
use drydock_state::{Build, StorageResult};

fn sha(c: char) -> CommitId {
    CommitId::new(c.to_string().repeat(40))
}

fn finished(id: &str, number: u64) -> Build {
    let mut build = Build::pending(ProjectId::new(id), number, sha('0'));
    build.finish(BuildStatus::Success, Duration::from_secs(1)).unwrap();
    build
}

struct Harness {
    store: Arc<MemoryBuildStore>,
    reporter: Arc<RecordingStatusReporter>,
    executor: Arc<ScriptedExecutor>,
    runner: Arc<BuildRunner>,
}

fn harness_with(store: MemoryBuildStore, executor: ScriptedExecutor) -> Harness {
    let store = Arc::new(store);
    let reporter = Arc::new(RecordingStatusReporter::new());
    let executor = Arc::new(executor);
    let runner = Arc::new(BuildRunner::new(
        store.clone(),
        reporter.clone(),
        executor.clone(),
    ));
    Harness {
        store,
        reporter,
        executor,
        runner,
    }
}

fn harness() -> Harness {
    harness_with(MemoryBuildStore::new(), ScriptedExecutor::passing())
}

#[tokio::test]
async fn numbers_sequential_runs_from_one() {
    let h = harness();
    let p = project("demo");

    let mut numbers = Vec::new();
    for c in ['a', 'b', 'c'] {
        numbers.push(h.runner.run(&p, &sha(c)).await.unwrap().number);
    }
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn numbers_concurrent_runs_without_repeats() {
    let h = harness_with(
        MemoryBuildStore::new(),
        ScriptedExecutor::passing().with_delay(Duration::from_millis(20)),
    );
    let p = project("demo");

    let mut handles = Vec::new();
    for i in 0..5u8 {
        let runner = h.runner.clone();
        let p = p.clone();
        let sha = sha((b'a' + i) as char);
        handles.push(tokio::spawn(async move { runner.run(&p, &sha).await }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().number);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn projects_are_numbered_independently() {
    let h = harness();
    let a = project("a");
    let b = project("b");

    assert_eq!(h.runner.run(&a, &sha('1')).await.unwrap().number, 1);
    assert_eq!(h.runner.run(&a, &sha('2')).await.unwrap().number, 2);
    assert_eq!(h.runner.run(&b, &sha('3')).await.unwrap().number, 1);
}

#[tokio::test]
async fn gap_in_history_is_not_filled() {
    let h = harness_with(
        MemoryBuildStore::with_builds([finished("demo", 1), finished("demo", 3)]),
        ScriptedExecutor::passing(),
    );
    let build = h.runner.run(&project("demo"), &sha('a')).await.unwrap();
    assert_eq!(build.number, 4);
}

#[tokio::test]
async fn empty_history_starts_at_one() {
    let h = harness();
    let build = h.runner.run(&project("demo"), &sha('a')).await.unwrap();
    assert_eq!(build.number, 1);
}

#[tokio::test]
async fn successful_build_is_terminal_and_persisted() {
    let h = harness();
    let p = project("demo");
    let build = h.runner.run(&p, &sha('a')).await.unwrap();

    assert_eq!(build.status, BuildStatus::Success);
    assert!(build.measured_duration().is_some());
    assert_eq!(build.sha, sha('a'));
    assert_eq!(h.store.get(&p.id, 1), Some(build));
    assert_eq!(h.executor.calls(), vec![(p.id.clone(), sha('a'))]);
    assert_eq!(
        h.reporter.states(),
        vec![BuildStatus::Pending, BuildStatus::Success]
    );
}

#[tokio::test]
async fn failing_command_records_failure_once() {
    let h = harness_with(MemoryBuildStore::new(), ScriptedExecutor::exiting(1));
    let build = h.runner.run(&project("demo"), &sha('a')).await.unwrap();

    assert_eq!(build.status, BuildStatus::Failure);
    assert!(build.duration >= 0.0);

    let writes = h.store.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].status, BuildStatus::Pending);
    assert!(writes[0].measured_duration().is_none());
    assert_eq!(writes[1].status, BuildStatus::Failure);
    assert_eq!(h.store.commit_count(), 2);
}

#[tokio::test]
async fn execution_error_becomes_failure() {
    let h = harness_with(MemoryBuildStore::new(), ScriptedExecutor::erroring());
    let build = h.runner.run(&project("demo"), &sha('a')).await.unwrap();

    assert_eq!(build.status, BuildStatus::Failure);
    assert!(build.measured_duration().is_some());
    assert_eq!(
        h.reporter.states(),
        vec![BuildStatus::Pending, BuildStatus::Failure]
    );
}

#[tokio::test]
async fn store_write_failure_is_fatal_and_unreported() {
    let h = harness();
    h.store.fail_writes(true);

    let err = h.runner.run(&project("demo"), &sha('a')).await.unwrap_err();
    match err {
        RunnerError::LocalPersistenceFailed {
            project, number, ..
        } => {
            assert_eq!(project.as_str(), "demo");
            assert_eq!(number, 1);
        }
        other => panic!("expected LocalPersistenceFailed, got {other:?}"),
    }
    assert!(h.reporter.reports().is_empty());
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn store_commit_failure_is_fatal_and_unreported() {
    let h = harness();
    h.store.fail_commits(true);

    let err = h.runner.run(&project("demo"), &sha('a')).await.unwrap_err();
    assert!(matches!(err, RunnerError::LocalPersistenceFailed { .. }));
    assert!(h.reporter.reports().is_empty());
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn remote_failure_does_not_fail_the_run() {
    let h = harness();
    h.reporter.fail(true);
    let p = project("demo");

    let build = h.runner.run(&p, &sha('a')).await.unwrap();
    assert_eq!(build.status, BuildStatus::Success);
    assert_eq!(h.store.get(&p.id, 1).unwrap().status, BuildStatus::Success);
    // both states were still attempted
    assert_eq!(h.reporter.reports().len(), 2);
}

// ---------------------------------------------------------------------------
// Ordering: a store and reporter sharing one journal
// ---------------------------------------------------------------------------

type Journal = Arc<Mutex<Vec<String>>>;

struct JournalStore {
    inner: MemoryBuildStore,
    journal: Journal,
}

#[async_trait]
impl BuildStore for JournalStore {
    async fn list_builds(&self, project: &ProjectId) -> StorageResult<Vec<Build>> {
        self.inner.list_builds(project).await
    }

    async fn add_or_update_build(&self, build: &Build) -> StorageResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("store {}", build.status));
        self.inner.add_or_update_build(build).await
    }

    async fn commit_changes(&self, message: &str) -> StorageResult<()> {
        self.journal.lock().unwrap().push("commit".to_string());
        self.inner.commit_changes(message).await
    }
}

struct JournalReporter {
    journal: Journal,
}

#[async_trait]
impl StatusReporter for JournalReporter {
    async fn set_status(
        &self,
        _repo_url: &str,
        _sha: &CommitId,
        state: BuildStatus,
        _target_url: Option<&str>,
    ) -> Result<(), ReportError> {
        self.journal.lock().unwrap().push(format!("report {state}"));
        Ok(())
    }
}

#[tokio::test]
async fn local_persistence_precedes_remote_report() {
    let journal: Journal = Arc::default();
    let runner = BuildRunner::new(
        Arc::new(JournalStore {
            inner: MemoryBuildStore::new(),
            journal: journal.clone(),
        }),
        Arc::new(JournalReporter {
            journal: journal.clone(),
        }),
        Arc::new(ScriptedExecutor::exiting(2)),
    );

    runner.run(&project("demo"), &sha('a')).await.unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "store pending",
            "commit",
            "report pending",
            "store failure",
            "commit",
            "report failure",
        ]
    );
}
