//! Trait contract tests for BuildStore.
//!
//! Each contract is written once against `&dyn BuildStore` and run against
//! both the in-memory fake and the git-backed store. Any conforming
//! implementation must pass these.

use std::time::Duration;

use drydock_state::fakes::MemoryBuildStore;
use drydock_state::storage_traits::*;
use drydock_state::{next_build_number, Build, BuildStatus, CommitId, GitBuildStore, ProjectId};

fn project() -> ProjectId {
    ProjectId::new("demo")
}

fn pending(number: u64) -> Build {
    Build::pending(project(), number, CommitId::new(format!("sha{number}")))
}

async fn contract_empty_history(store: &dyn BuildStore) {
    let builds = store.list_builds(&project()).await.unwrap();
    assert!(builds.is_empty());
}

async fn contract_write_then_list(store: &dyn BuildStore) {
    store.add_or_update_build(&pending(1)).await.unwrap();
    store.add_or_update_build(&pending(2)).await.unwrap();

    let mut numbers: Vec<u64> = store
        .list_builds(&project())
        .await
        .unwrap()
        .iter()
        .map(|b| b.number)
        .collect();
    numbers.sort();
    assert_eq!(numbers, vec![1, 2]);
}

async fn contract_update_is_idempotent_on_number(store: &dyn BuildStore) {
    let mut build = pending(1);
    store.add_or_update_build(&build).await.unwrap();

    build
        .finish(BuildStatus::Success, Duration::from_secs(3))
        .unwrap();
    store.add_or_update_build(&build).await.unwrap();
    store.add_or_update_build(&build).await.unwrap();

    let builds = store.list_builds(&project()).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Success);
    assert_eq!(builds[0].duration, 3.0);
}

async fn contract_projects_are_isolated(store: &dyn BuildStore) {
    store.add_or_update_build(&pending(1)).await.unwrap();
    let other = Build::pending(ProjectId::new("other"), 5, CommitId::new("ffff"));
    store.add_or_update_build(&other).await.unwrap();

    let builds = store.list_builds(&project()).await.unwrap();
    assert_eq!(builds.len(), 1);
    let builds = store.list_builds(&ProjectId::new("other")).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].number, 5);
}

async fn contract_round_trips_fields(store: &dyn BuildStore) {
    let mut build = pending(4);
    build
        .finish(BuildStatus::Failure, Duration::from_millis(250))
        .unwrap();
    store.add_or_update_build(&build).await.unwrap();

    let builds = store.list_builds(&project()).await.unwrap();
    assert_eq!(builds, vec![build]);
}

async fn contract_next_number_after_gap(store: &dyn BuildStore) {
    store.add_or_update_build(&pending(1)).await.unwrap();
    store.add_or_update_build(&pending(3)).await.unwrap();

    let builds = store.list_builds(&project()).await.unwrap();
    assert_eq!(next_build_number(&builds), 4);
}

async fn run_all(make: impl Fn() -> (Box<dyn BuildStore>, Option<tempfile::TempDir>)) {
    let (s, _d) = make();
    contract_empty_history(s.as_ref()).await;
    let (s, _d) = make();
    contract_write_then_list(s.as_ref()).await;
    let (s, _d) = make();
    contract_update_is_idempotent_on_number(s.as_ref()).await;
    let (s, _d) = make();
    contract_projects_are_isolated(s.as_ref()).await;
    let (s, _d) = make();
    contract_round_trips_fields(s.as_ref()).await;
    let (s, _d) = make();
    contract_next_number_after_gap(s.as_ref()).await;
}

#[tokio::test]
async fn memory_store_satisfies_contracts() {
    run_all(|| (Box::new(MemoryBuildStore::new()), None)).await;
}

#[tokio::test]
async fn git_store_satisfies_contracts() {
    run_all(|| {
        let dir = tempfile::tempdir().unwrap();
        let store = GitBuildStore::open(dir.path()).unwrap();
        (Box::new(store), Some(dir))
    })
    .await;
}

// ===========================================================================
// MemoryBuildStore failure injection
// ===========================================================================

#[tokio::test]
async fn memory_store_rejects_writes_when_failing() {
    let store = MemoryBuildStore::new();
    store.fail_writes(true);
    assert!(store.add_or_update_build(&pending(1)).await.is_err());
    assert!(store.writes().is_empty());

    store.fail_writes(false);
    store.add_or_update_build(&pending(1)).await.unwrap();
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn memory_store_rejects_commits_when_failing() {
    let store = MemoryBuildStore::new();
    store.fail_commits(true);
    assert!(store.commit_changes("msg").await.is_err());
    assert_eq!(store.commit_count(), 0);

    store.fail_commits(false);
    store.commit_changes("msg").await.unwrap();
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn memory_store_seeded_history() {
    let store = MemoryBuildStore::with_builds(vec![pending(1), pending(3)]);
    let builds = store.list_builds(&project()).await.unwrap();
    assert_eq!(next_build_number(&builds), 4);
    assert!(store.get(&project(), 3).is_some());
    assert!(store.get(&project(), 2).is_none());
}
