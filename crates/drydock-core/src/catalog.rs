//! Project catalog loaded from TOML.
//!
//! ```toml
//! [[project]]
//! id = "drydock"
//! name = "drydock"
//! repo_url = "https://github.com/stevedores-org/drydock"
//! local_repo_path = "/var/lib/drydock/workspaces/drydock"
//! build_command = ["cargo", "test", "--workspace"]
//! build_timeout_secs = 1800
//!
//! [project.env]
//! RUST_BACKTRACE = "1"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use drydock_ci::{BuildCommand, DEFAULT_TIMEOUT_SECS};
use drydock_state::{path_segment, ProjectId};
use serde::Deserialize;

use crate::domain::{DomainError, Project, RepoSlug, Result};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "project")]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    id: String,
    name: Option<String>,
    repo_url: String,
    #[serde(default)]
    local_repo_path: PathBuf,
    build_command: Vec<String>,
    build_timeout_secs: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

impl ProjectEntry {
    fn into_project(self) -> Project {
        let id = ProjectId::new(self.id);
        let mut build = BuildCommand::new(self.build_command)
            .with_timeout(self.build_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        build.env = self.env;
        Project {
            name: self.name.unwrap_or_else(|| id.to_string()),
            id,
            repo_url: self.repo_url,
            local_repo_path: self.local_repo_path,
            build,
        }
    }
}

/// The set of projects under CI management.
#[derive(Debug, Clone, Default)]
pub struct ProjectCatalog {
    projects: Vec<Project>,
}

impl ProjectCatalog {
    /// Build a catalog from already-constructed projects, validating it.
    pub fn new(projects: Vec<Project>) -> Result<Self> {
        let catalog = Self { projects };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(raw)?;
        Self::new(
            file.projects
                .into_iter()
                .map(ProjectEntry::into_project)
                .collect(),
        )
    }

    /// Reject unsafe or duplicate ids, empty build commands and unparseable
    /// repo URLs.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for project in &self.projects {
            // ids name directories under the data dir
            if path_segment(project.id.as_str()) != project.id.as_str() {
                return Err(DomainError::InvalidProjectId(project.id.to_string()));
            }
            if !seen.insert(&project.id) {
                return Err(DomainError::DuplicateProject(project.id.clone()));
            }
            if project.build.argv.is_empty() {
                return Err(DomainError::EmptyBuildCommand(project.id.clone()));
            }
            RepoSlug::parse(&project.repo_url)?;
        }
        Ok(())
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| &p.id == id)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
