//! Podman engine options
//!
//! Every option the engine passes to runtime calls (remove, logs, kill,
//! volume removal) is fixed here once, when the engine is constructed, and
//! shared read-only by all operations afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BackendError, Result};

/// Marker file podman creates inside every container it runs
pub const CONTAINER_MARKER: &str = "/run/.containerenv";

/// Socket used when `XDG_RUNTIME_DIR` is not set (rootful podman)
pub const ROOTFUL_SOCKET: &str = "/run/podman/podman.sock";

/// Options for removing step containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove a running container
    pub force: bool,
    /// Remove anonymous volumes attached to the container
    pub volumes: bool,
}

/// Options for retrieving container logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
}

/// Podman engine configuration
#[derive(Debug, Clone)]
pub struct PodmanOptions {
    /// Path of the runtime API socket
    pub socket: PathBuf,

    /// Timeout applied by the API client to each request
    pub connect_timeout: Duration,

    /// File whose presence means we are running inside a container
    pub container_marker: PathBuf,

    pub remove: RemoveOptions,

    pub logs: LogOptions,

    /// Signal sent by kill
    pub kill_signal: String,

    /// Remove volumes even when still referenced
    pub volume_remove_force: bool,

    /// Number of log lines the tailer buffers between runtime and reader
    pub log_queue_capacity: usize,

    /// Byte capacity of the pipe handed to the log reader
    pub log_pipe_capacity: usize,
}

impl PodmanOptions {
    /// Creates options with defaults for the given socket
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            connect_timeout: Duration::from_secs(120),
            container_marker: PathBuf::from(CONTAINER_MARKER),
            remove: RemoveOptions {
                force: false,
                volumes: true,
            },
            logs: LogOptions {
                follow: true,
                stdout: true,
                stderr: true,
                timestamps: false,
            },
            kill_signal: "SIGKILL".to_string(),
            volume_remove_force: true,
            log_queue_capacity: 10_000,
            log_pipe_capacity: 64 * 1024,
        }
    }

    /// Creates options from environment variables
    ///
    /// Recognized environment variables:
    /// - KEEL_PODMAN_SOCKET (optional, default: $XDG_RUNTIME_DIR/podman/podman.sock)
    /// - KEEL_PODMAN_TIMEOUT (optional, seconds, default: 120)
    /// - KEEL_LOG_QUEUE_CAPACITY (optional, default: 10000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates options from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let socket = lookup("KEEL_PODMAN_SOCKET")
            .map(PathBuf::from)
            .or_else(|| {
                lookup("XDG_RUNTIME_DIR")
                    .filter(|dir| !dir.is_empty())
                    .map(|dir| PathBuf::from(dir).join("podman").join("podman.sock"))
            })
            .unwrap_or_else(|| PathBuf::from(ROOTFUL_SOCKET));

        let mut options = Self::new(socket);

        if let Some(timeout) = lookup("KEEL_PODMAN_TIMEOUT").and_then(|s| s.parse::<u64>().ok()) {
            options.connect_timeout = Duration::from_secs(timeout);
        }

        if let Some(capacity) =
            lookup("KEEL_LOG_QUEUE_CAPACITY").and_then(|s| s.parse::<usize>().ok())
        {
            options.log_queue_capacity = capacity;
        }

        options
    }

    /// Overrides the socket path
    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = socket.into();
        self
    }

    /// Validates the options
    pub fn validate(&self) -> Result<()> {
        if self.socket.as_os_str().is_empty() {
            return Err(BackendError::InvalidOptions(
                "socket path cannot be empty".to_string(),
            ));
        }

        if self.socket.to_str().is_none() {
            return Err(BackendError::InvalidOptions(
                "socket path must be valid UTF-8".to_string(),
            ));
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(BackendError::InvalidOptions(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        if self.log_queue_capacity == 0 {
            return Err(BackendError::InvalidOptions(
                "log_queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.log_pipe_capacity == 0 {
            return Err(BackendError::InvalidOptions(
                "log_pipe_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PodmanOptions {
    fn default() -> Self {
        Self::from_env()
    }
}
