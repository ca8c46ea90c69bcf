//! Runner configuration
//!
//! Resolved once from the command line (and the environment through clap)
//! before any engine is touched.

use keel_backend::PodmanOptions;
use std::path::PathBuf;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Compiled pipeline to run (JSON)
    pub pipeline: PathBuf,

    /// Engine name, or "auto" to pick the first available one
    pub backend: String,

    /// Options handed to the podman engine
    pub podman: PodmanOptions,
}

impl Config {
    /// Creates a configuration with auto-detection and podman options
    /// taken from the environment
    pub fn new(pipeline: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: pipeline.into(),
            backend: keel_backend::AUTO_DETECT.to_string(),
            podman: PodmanOptions::from_env(),
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Overrides the podman socket when one was given
    pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
        if let Some(socket) = socket {
            self.podman = self.podman.with_socket(socket);
        }
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.as_os_str().is_empty() {
            anyhow::bail!("pipeline path cannot be empty");
        }

        if self.backend.is_empty() {
            anyhow::bail!("backend cannot be empty");
        }

        // Checked again by the engine on load.
        self.podman.validate()?;

        Ok(())
    }
}
