//! Container specification types
//!
//! A `ContainerSpec` is the runtime-facing translation of a step. It is
//! built fresh for every execution and handed to the runtime's create call.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use super::namespace::Namespace;

/// Runtime container specification for one step
///
/// `None` on `env`, `command` and `entrypoint` means "use the image default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub working_dir: String,
    pub env: Option<HashMap<String, String>>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub mounts: Vec<Mount>,
    pub log_config: LogConfig,
    pub terminal: bool,
    pub privileged: bool,
    pub shm_size: i64,
    pub sysctls: HashMap<String, String>,
    pub ipc: Option<Namespace>,
    pub dns_servers: Vec<IpAddr>,
    pub dns_search: Vec<String>,
    pub extra_hosts: Vec<String>,
}

/// Where a mount gets its content from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// Host path bind mount
    Bind(String),
    /// Named volume
    Volume(String),
    /// Volume created by the runtime for this container only
    Anonymous,
}

/// A parsed mount descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: MountSource,
    pub destination: String,
    pub options: Vec<String>,
}

impl Mount {
    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}

impl fmt::Display for Mount {
    /// Renders the mount back to `src:dest[:options]` form
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            MountSource::Bind(src) | MountSource::Volume(src) => {
                write!(f, "{}:{}", src, self.destination)?
            }
            MountSource::Anonymous => write!(f, "{}", self.destination)?,
        }
        if !self.options.is_empty() {
            write!(f, ":{}", self.options.join(","))?;
        }
        Ok(())
    }
}

/// Log driver configuration; an empty driver keeps the runtime default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub driver: Option<String>,
    pub options: HashMap<String, String>,
}
