//! Build command definitions and configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default build timeout (one hour).
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// The command a project runs to build and test a commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildCommand {
    /// Command to execute (first element is executable).
    pub argv: Vec<String>,

    /// Timeout in seconds. Zero disables the timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Extra environment for the build process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl BuildCommand {
    /// Create a build command from an argv list with the default timeout.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            env: BTreeMap::new(),
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: &str) -> Self {
        Self::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    /// Override the timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}
