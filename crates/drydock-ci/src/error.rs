//! Error types for build command execution

use thiserror::Error;

/// Why a build could not be executed to completion.
///
/// A command that runs and exits non-zero is *not* an error; it is a
/// [`CommandResult`](crate::CommandResult) that did not pass.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("build command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("I/O error while waiting for build: {0}")]
    Io(#[from] std::io::Error),

    #[error("workspace error: {0}")]
    Workspace(String),
}

/// Result type for build execution
pub type Result<T> = std::result::Result<T, ExecutionError>;
