//! drydock-state: build history persistence for drydock
//!
//! This crate owns the `Build` record and the `BuildStore` abstraction that
//! every other layer writes through. The store is the single source of truth
//! for build history; remote status mirrors are best effort and live above
//! this layer.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: append-only history, atomic record writes, durable commits.
//!
//! ## Key Components
//!
//! - `Build` / `BuildStatus`: the record and its `pending -> terminal` lifecycle
//! - `BuildStore`: async storage trait
//! - `GitBuildStore`: JSON records committed to a git repository
//! - `fakes::MemoryBuildStore`: in-memory store for tests

mod error;
pub mod fakes;
pub mod git_store;
mod schema;
pub mod storage_traits;

pub use error::{RecordError, StorageError};
pub use git_store::{path_segment, GitBuildStore};
pub use schema::{
    next_build_number, Build, BuildStatus, CommitId, ProjectId, UNMEASURED_DURATION,
};
pub use storage_traits::{BuildStore, StorageResult};
