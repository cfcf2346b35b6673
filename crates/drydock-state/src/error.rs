//! Error types for drydock-state

use thiserror::Error;

use crate::schema::BuildStatus;

/// Errors that can occur while reading or writing the build history
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A git command against the record repository failed
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// A record on disk does not match its location
    #[error("Invalid build record {path}: {reason}")]
    InvalidRecord { path: String, reason: String },

    /// Backend unavailable (used by fakes to simulate outages)
    #[error("Build store unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced by build record state changes
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("Invalid build status transition: {current} -> {requested}")]
    InvalidStatusTransition {
        current: BuildStatus,
        requested: BuildStatus,
    },
}
