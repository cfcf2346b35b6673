//! Structured observability hooks for build and poll lifecycle events.
//!
//! This module provides:
//! - A build-scoped span (`build_span`) to instrument a whole run with
//! - Emission functions for key lifecycle events: build start and finish,
//!   status reconciliation failures, and poll tick summaries
//!
//! Events are emitted at `info!` level unless they describe a failure.
//! Filter with `RUST_LOG`; pass `--json` to the binaries for JSON output.

use std::time::Duration;

use drydock_state::{Build, BuildStatus, CommitId, ProjectId};
use tracing::{info, Span};

use crate::poller::TickReport;

/// Span tagging everything logged during one build of `project` at `sha`.
///
/// # Example
///
/// ```ignore
/// use tracing::Instrument;
/// runner.run_locked(project, sha).instrument(build_span(&project.id, sha)).await
/// ```
pub fn build_span(project: &ProjectId, sha: &CommitId) -> Span {
    tracing::info_span!("drydock.build", project = %project, sha = %sha.short())
}

/// Emit event: build allocated and marked pending.
pub fn emit_build_started(build: &Build) {
    info!(
        event = "build.started",
        project = %build.project_id,
        build = build.number,
        sha = %build.sha.short(),
    );
}

/// Emit event: build reached a terminal status.
pub fn emit_build_finished(build: &Build, elapsed: Duration) {
    info!(
        event = "build.finished",
        project = %build.project_id,
        build = build.number,
        status = %build.status,
        success = build.status == BuildStatus::Success,
        duration_ms = elapsed.as_millis() as u64,
    );
}

/// Emit event: the build command could not be run to completion.
pub fn emit_execution_error(build: &Build, error: &dyn std::fmt::Display) {
    tracing::warn!(
        event = "build.execution_error",
        project = %build.project_id,
        build = build.number,
        error = %error,
    );
}

/// Emit event: the remote status mirror rejected an update (non-fatal).
pub fn emit_status_report_failed(build: &Build, error: &dyn std::fmt::Display) {
    tracing::warn!(
        event = "status.report_failed",
        project = %build.project_id,
        build = build.number,
        status = %build.status,
        error = %error,
    );
}

/// Emit event: local persistence failed; the run is aborted.
pub fn emit_local_persist_failed(build: &Build, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "status.persist_failed",
        project = %build.project_id,
        build = build.number,
        status = %build.status,
        error = %error,
    );
}

/// Emit event: poll tick completed.
pub fn emit_tick_finished(report: &TickReport, elapsed: Duration) {
    info!(
        event = "poll.tick_finished",
        projects_seen = report.projects_seen,
        skipped_no_access = report.skipped_no_access,
        failed_projects = report.failed_projects,
        builds_triggered = report.builds_triggered,
        skipped_already_built = report.skipped_already_built,
        branch_errors = report.branch_errors,
        duration_ms = elapsed.as_millis() as u64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_span_create() {
        let span = build_span(&ProjectId::new("demo"), &CommitId::new("f".repeat(40)));
        let _entered = span.enter();
    }
}
