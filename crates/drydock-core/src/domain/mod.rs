//! Domain models for drydock.
//!
//! - `Project`: a repository under CI management and its build command
//! - `RepoSlug`: `owner/name` parsed from a remote URL
//! - `Session`: the credentials a poll runs under

pub mod error;
pub mod project;

pub use error::{DomainError, Result};
pub use project::{Project, RepoSlug, Session};
