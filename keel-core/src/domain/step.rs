//! Step domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One executable unit of a pipeline: a single container run
///
/// The `name` is the only handle a backend uses to address the container
/// in every runtime call, so it must be unique within a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub name: String,
    pub image: String,
    pub working_dir: String,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub environment: HashMap<String, String>,
    /// Mount strings in `[src:]dest[:options]` form
    pub volumes: Vec<String>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    /// Extra `/etc/hosts` entries in `host:ip` form
    pub extra_hosts: Vec<String>,
    pub ipc_mode: String,
    /// Shared memory size in bytes (0 = runtime default)
    pub shm_size: i64,
    pub sysctls: HashMap<String, String>,
    pub auth_config: AuthConfig,
    pub pull: PullPolicy,
    pub labels: HashMap<String, String>,
}

impl Step {
    /// Creates a step with a name and image, everything else left to defaults
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}

/// Registry credentials used when pulling the step image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    /// Credentials are only used when both username and password are set
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// When to pull the step image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull on every execution
    Always,
    /// Pull only when the image is missing locally
    #[default]
    IfNotPresent,
}

impl PullPolicy {
    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl From<bool> for PullPolicy {
    fn from(pull: bool) -> Self {
        if pull { Self::Always } else { Self::IfNotPresent }
    }
}
