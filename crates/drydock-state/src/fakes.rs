//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryBuildStore`, which satisfies the `BuildStore` contract
//! without touching disk and can be told to fail writes or commits.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{Build, ProjectId};
use crate::storage_traits::*;

/// In-memory build store backed by a `HashMap<project, BTreeMap<number, Build>>`.
///
/// Every successful `add_or_update_build` is also appended to a write log so
/// tests can assert how many times (and in which state) a build was persisted.
#[derive(Debug, Default)]
pub struct MemoryBuildStore {
    builds: Mutex<HashMap<ProjectId, BTreeMap<u64, Build>>>,
    writes: Mutex<Vec<Build>>,
    commits: AtomicUsize,
    fail_writes: AtomicBool,
    fail_commits: AtomicBool,
}

impl MemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing history.
    pub fn with_builds(builds: impl IntoIterator<Item = Build>) -> Self {
        let store = Self::new();
        {
            let mut map = store.builds.lock().unwrap();
            for build in builds {
                map.entry(build.project_id.clone())
                    .or_default()
                    .insert(build.number, build);
            }
        }
        store
    }

    /// Make every subsequent `add_or_update_build` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `commit_changes` fail.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<Build> {
        self.writes.lock().unwrap().clone()
    }

    /// Number of successful `commit_changes` calls.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Current record for a build number, if any.
    pub fn get(&self, project: &ProjectId, number: u64) -> Option<Build> {
        let builds = self.builds.lock().unwrap();
        builds.get(project).and_then(|m| m.get(&number).cloned())
    }
}

#[async_trait]
impl BuildStore for MemoryBuildStore {
    async fn list_builds(&self, project: &ProjectId) -> StorageResult<Vec<Build>> {
        let builds = self.builds.lock().unwrap();
        Ok(builds
            .get(project)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_or_update_build(&self, build: &Build) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "write of build #{} rejected",
                build.number
            )));
        }
        let mut builds = self.builds.lock().unwrap();
        builds
            .entry(build.project_id.clone())
            .or_default()
            .insert(build.number, build.clone());
        self.writes.lock().unwrap().push(build.clone());
        Ok(())
    }

    async fn commit_changes(&self, _message: &str) -> StorageResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("commit rejected".to_string()));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
