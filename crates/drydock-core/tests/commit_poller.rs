//! CommitPoller behaviour against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use drydock_core::fakes::{
    project, FakeWorkspaces, RecordingStatusReporter, ScriptedExecutor, StaticAccessControl,
};
use drydock_core::{
    run_forever, BuildCommand, BuildRunner, BuildStatus, BuildStore, CommitId, CommitPoller,
    PollSchedule, Project, ProjectId, Session, TickReport, WorkspaceExecutor,
};
use drydock_state::fakes::MemoryBuildStore;

const SHA_1: &str = "1111111111111111111111111111111111111111";
const SHA_2: &str = "2222222222222222222222222222222222222222";
const SHA_3: &str = "3333333333333333333333333333333333333333";

struct Setup {
    _dir: tempfile::TempDir,
    workspaces: Arc<FakeWorkspaces>,
    store: Arc<MemoryBuildStore>,
    executor: Arc<ScriptedExecutor>,
    poller: CommitPoller,
}

fn setup(access: StaticAccessControl) -> Setup {
    setup_with(access, ScriptedExecutor::passing())
}

fn setup_with(access: StaticAccessControl, executor: ScriptedExecutor) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let workspaces = Arc::new(FakeWorkspaces::new(dir.path()));
    let store = Arc::new(MemoryBuildStore::new());
    let executor = Arc::new(executor);
    let runner = Arc::new(BuildRunner::new(
        store.clone(),
        Arc::new(RecordingStatusReporter::new()),
        executor.clone(),
    ));
    let poller = CommitPoller::new(Arc::new(access), workspaces.clone(), runner);
    Setup {
        _dir: dir,
        workspaces,
        store,
        executor,
        poller,
    }
}

fn session() -> Session {
    Session::new("octocat", "token")
}

async fn history(store: &MemoryBuildStore, p: &Project) -> Vec<CommitId> {
    let mut builds = store.list_builds(&p.id).await.unwrap();
    builds.sort_by_key(|b| b.number);
    builds.into_iter().map(|b| b.sha).collect()
}

#[tokio::test]
async fn broken_project_does_not_stop_the_tick() {
    let broken = project("broken");
    let healthy = project("healthy");
    let s = setup(StaticAccessControl::new(vec![broken.clone(), healthy.clone()]));

    s.workspaces.workspace_for(&broken).fail_fetch(true);
    s.workspaces.workspace_for(&broken).set_branch("origin/main", SHA_1);
    s.workspaces.workspace_for(&healthy).set_branch("origin/main", SHA_2);

    let report = s.poller.tick(&session()).await;

    assert_eq!(report.projects_seen, 2);
    assert_eq!(report.failed_projects, 1);
    assert_eq!(report.builds_triggered, 1);
    assert!(history(&s.store, &broken).await.is_empty());
    assert_eq!(history(&s.store, &healthy).await, vec![CommitId::new(SHA_2)]);
}

#[tokio::test]
async fn builds_every_real_branch_tip() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    let ws = s.workspaces.workspace_for(&p);
    ws.set_symbolic("origin/HEAD", SHA_1);
    ws.set_branch("origin/main", SHA_1);
    ws.set_branch("origin/feature", SHA_2);

    let report = s.poller.tick(&session()).await;

    assert_eq!(report.builds_triggered, 2);
    assert_eq!(ws.fetch_count(), 1);
    assert_eq!(ws.checkouts(), vec!["origin/main", "origin/feature"]);
    assert_eq!(
        history(&s.store, &p).await,
        vec![CommitId::new(SHA_1), CommitId::new(SHA_2)]
    );
}

#[tokio::test]
async fn symbolic_head_is_never_checked_out() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    let ws = s.workspaces.workspace_for(&p);
    ws.set_branch("origin/HEAD", SHA_1);
    ws.set_branch("origin/HEAD -> origin/main", SHA_1);
    ws.set_branch("origin/main", SHA_1);

    let report = s.poller.tick(&session()).await;

    assert_eq!(report.builds_triggered, 1);
    assert_eq!(ws.checkouts(), vec!["origin/main"]);
}

#[tokio::test]
async fn unchanged_heads_are_not_rebuilt() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    let ws = s.workspaces.workspace_for(&p);
    ws.set_branch("origin/main", SHA_1);
    ws.set_branch("origin/dev", SHA_2);

    let first = s.poller.tick(&session()).await;
    assert_eq!(first.builds_triggered, 2);

    let second = s.poller.tick(&session()).await;
    assert_eq!(
        second,
        TickReport {
            projects_seen: 1,
            builds_triggered: 0,
            skipped_already_built: 2,
            ..TickReport::default()
        }
    );
    assert_eq!(s.executor.calls().len(), 2);
}

#[tokio::test]
async fn moved_head_triggers_exactly_one_build() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    let ws = s.workspaces.workspace_for(&p);
    ws.set_branch("origin/main", SHA_1);
    ws.set_branch("origin/dev", SHA_2);
    s.poller.tick(&session()).await;

    ws.set_branch("origin/main", SHA_3);
    let report = s.poller.tick(&session()).await;

    assert_eq!(report.builds_triggered, 1);
    assert_eq!(report.skipped_already_built, 1);
    assert_eq!(
        s.poller
            .built_commits()
            .last_built(&p.id, "origin/main"),
        Some(CommitId::new(SHA_3))
    );
    let builds = s.store.list_builds(&p.id).await.unwrap();
    assert_eq!(builds.iter().map(|b| b.number).max(), Some(3));
}

#[tokio::test]
async fn failed_builds_are_not_retried() {
    let p = project("demo");
    let s = setup_with(
        StaticAccessControl::new(vec![p.clone()]),
        ScriptedExecutor::exiting(1),
    );
    s.workspaces
        .workspace_for(&p)
        .set_branch("origin/main", SHA_1);

    s.poller.tick(&session()).await;
    let report = s.poller.tick(&session()).await;

    assert_eq!(report.skipped_already_built, 1);
    let builds = s.store.list_builds(&p.id).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Failure);
}

#[tokio::test]
async fn aborted_run_is_retried_next_tick() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    s.workspaces
        .workspace_for(&p)
        .set_branch("origin/main", SHA_1);

    s.store.fail_writes(true);
    let first = s.poller.tick(&session()).await;
    assert_eq!(first.branch_errors, 1);
    assert_eq!(first.builds_triggered, 0);

    s.store.fail_writes(false);
    let second = s.poller.tick(&session()).await;
    assert_eq!(second.builds_triggered, 1);
}

#[tokio::test]
async fn checkout_failure_only_skips_that_branch() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    let ws = s.workspaces.workspace_for(&p);
    ws.set_branch("origin/broken", SHA_1);
    ws.set_branch("origin/main", SHA_2);
    ws.fail_checkout("origin/broken");

    let report = s.poller.tick(&session()).await;

    assert_eq!(report.branch_errors, 1);
    assert_eq!(report.builds_triggered, 1);
    assert_eq!(history(&s.store, &p).await, vec![CommitId::new(SHA_2)]);
}

#[tokio::test]
async fn inaccessible_projects_are_skipped() {
    let allowed = project("allowed");
    let denied = project("denied");
    let flaky = project("flaky");
    let s = setup(
        StaticAccessControl::new(vec![allowed.clone(), denied.clone(), flaky.clone()])
            .deny("denied")
            .broken("flaky"),
    );
    for p in [&allowed, &denied, &flaky] {
        s.workspaces.workspace_for(p).set_branch("origin/main", SHA_1);
    }

    let report = s.poller.tick(&session()).await;

    assert_eq!(report.projects_seen, 3);
    assert_eq!(report.skipped_no_access, 1);
    assert_eq!(report.failed_projects, 1);
    assert_eq!(report.builds_triggered, 1);
    assert_eq!(s.workspaces.workspace_for(&denied).fetch_count(), 0);
    assert_eq!(s.workspaces.workspace_for(&flaky).fetch_count(), 0);
}

#[tokio::test]
async fn listing_failure_yields_empty_report() {
    let s = setup(StaticAccessControl::new(vec![project("demo")]).failing_listing());
    let report = s.poller.tick(&session()).await;
    assert_eq!(report, TickReport::default());
}

#[tokio::test(start_paused = true)]
async fn run_forever_idles_between_ticks_until_shutdown() {
    let p = project("demo");
    let s = setup(StaticAccessControl::new(vec![p.clone()]));
    s.workspaces
        .workspace_for(&p)
        .set_branch("origin/main", SHA_1);

    let schedule = PollSchedule {
        interval: Duration::from_secs(3),
        tick_timeout: None,
    };
    // ticks at t = 0, 3, 6, 9; shutdown at t = 10 lands in the idle period
    let ticks = run_forever(
        &s.poller,
        &session(),
        schedule,
        tokio::time::sleep(Duration::from_secs(10)),
    )
    .await;

    assert_eq!(ticks, 4);
    assert_eq!(s.workspaces.workspace_for(&p).fetch_count(), 4);
    assert_eq!(s.executor.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_tick_still_finishes_its_build() {
    let p = project("demo");
    let s = setup_with(
        StaticAccessControl::new(vec![p.clone()]),
        ScriptedExecutor::passing().with_delay(Duration::from_secs(60)),
    );
    s.workspaces
        .workspace_for(&p)
        .set_branch("origin/main", SHA_1);

    let schedule = PollSchedule {
        interval: Duration::from_secs(3),
        tick_timeout: Some(Duration::from_secs(5)),
    };
    // tick 1 gives up at t = 5 while the build runs on; tick 2 at t = 8 sees
    // the commit already claimed; shutdown at t = 9 falls in the idle period
    let ticks = run_forever(
        &s.poller,
        &session(),
        schedule,
        tokio::time::sleep(Duration::from_secs(9)),
    )
    .await;

    assert_eq!(ticks, 2);
    assert_eq!(s.executor.calls().len(), 1);

    let builds = s.store.list_builds(&ProjectId::new("demo")).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Success);
    assert!(builds[0].duration >= 0.0);
}

#[tokio::test]
async fn abandoned_tick_releases_the_build_tree() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = project("slow");
    p.build = BuildCommand::shell("sleep 1");

    let workspaces = Arc::new(FakeWorkspaces::new(dir.path()));
    let ws = workspaces.workspace_for(&p);
    ws.set_branch("origin/main", SHA_1);

    let store = Arc::new(MemoryBuildStore::new());
    let reporter = Arc::new(RecordingStatusReporter::new());
    let runner = Arc::new(BuildRunner::new(
        store.clone(),
        reporter.clone(),
        Arc::new(WorkspaceExecutor::new(workspaces.clone())),
    ));
    let poller = CommitPoller::new(
        Arc::new(StaticAccessControl::new(vec![p.clone()])),
        workspaces.clone(),
        runner,
    );

    let schedule = PollSchedule {
        interval: Duration::from_secs(3),
        tick_timeout: Some(Duration::from_millis(100)),
    };
    let ticks = run_forever(&poller, &session(), schedule, async {}).await;

    assert_eq!(ticks, 1);
    let builds = store.list_builds(&p.id).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Success);
    assert_eq!(
        reporter.states(),
        vec![BuildStatus::Pending, BuildStatus::Success]
    );
    assert_eq!(ws.prepared_trees(), 1);
    assert_eq!(ws.live_trees(), 0);
}
