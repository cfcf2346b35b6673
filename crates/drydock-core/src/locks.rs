//! Per-project mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use drydock_state::ProjectId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A lazily-populated registry of one async mutex per project.
///
/// Clones share the registry. Guards are owned so they can be held across
/// awaits inside a spawned task.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    inner: Arc<Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, project: &ProjectId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(project.clone()).or_default().clone()
    }

    /// Wait for exclusive access to `project`.
    pub async fn lock(&self, project: &ProjectId) -> OwnedMutexGuard<()> {
        self.slot(project).lock_owned().await
    }

    /// Take the lock only if nobody holds it.
    pub fn try_lock(&self, project: &ProjectId) -> Option<OwnedMutexGuard<()>> {
        self.slot(project).try_lock_owned().ok()
    }
}
