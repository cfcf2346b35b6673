//! drydock core library
//!
//! The build-triggering and status-synchronization engine:
//! - `BuildRunner`: numbers, executes and reconciles one build
//! - `CommitPoller`: finds new branch tips and hands them to the runner
//! - collaborator traits (`RepoWorkspace`, `StatusReporter`, `AccessControl`,
//!   `BuildExecutor`) with git, GitHub and subprocess implementations

pub mod access;
pub mod build_runner;
pub mod catalog;
pub mod controller;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod git;
pub mod github;
pub mod locks;
pub mod metrics;
pub mod obs;
pub mod poller;
pub mod status;
pub mod telemetry;
pub mod workspace;

pub use access::{AccessControl, AccessError, GitHubAccessControl};
pub use build_runner::{BuildRunner, RunnerError};
pub use catalog::ProjectCatalog;
pub use controller::{Controller, ControllerConfig, ControllerError};
pub use domain::{DomainError, Project, RepoSlug, Session};
pub use executor::{build_env, BuildExecutor, BuildOutcome, WorkspaceExecutor};
pub use git::{GitWorkspace, GitWorkspaceProvider};
pub use github::{GitHubClient, GitHubError, GitHubStatusReporter};
pub use locks::ProjectLocks;
pub use poller::{run_forever, BuiltCommits, CommitPoller, PollSchedule, TickReport};
pub use status::{NoopStatusReporter, ReportError, StatusReporter};
pub use workspace::{
    BuildTree, RemoteBranch, RepoWorkspace, WorkspaceError, WorkspaceProvider, WorkspaceResult,
};

pub use drydock_ci::{BuildCommand, ExecutionError};
pub use drydock_state::{Build, BuildStatus, BuildStore, CommitId, GitBuildStore, ProjectId};

pub use metrics::METRICS;
pub use obs::{
    build_span, emit_build_finished, emit_build_started, emit_status_report_failed,
    emit_tick_finished,
};
pub use telemetry::init_tracing;

/// drydock version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
