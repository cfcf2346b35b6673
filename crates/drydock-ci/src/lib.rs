//! drydock CI - build command execution
//!
//! Provides the pieces the build runner needs to execute a project's build:
//! - `BuildCommand`: argv, timeout and environment for a project build
//! - `CommandRunner`: runs a command in a directory with a timeout
//! - `ExecutionError`: everything that stops a build from running to completion

mod error;
pub mod runner;
pub mod stage;

// Re-export key types
pub use error::{ExecutionError, Result};
pub use runner::{CommandResult, CommandRunner};
pub use stage::{BuildCommand, DEFAULT_TIMEOUT_SECS};
