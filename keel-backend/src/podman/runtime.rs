//! Container runtime seam
//!
//! The lifecycle driver talks to the runtime only through this trait. The
//! production implementation wraps the runtime's API client; tests plug in
//! a recording implementation.

use async_trait::async_trait;
use keel_core::{AuthConfig, Network, Volume};
use tokio::sync::mpsc;

use super::config::{LogOptions, RemoveOptions};
use super::spec::ContainerSpec;
use crate::error::Result;

/// Exit information read from an inspected container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStatus {
    pub exit_code: i64,
    pub oom_killed: bool,
}

/// Typed calls against a container runtime
///
/// Containers are addressed by name. Implementations hold a shared
/// connection and must be safe to call concurrently.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates a named volume
    async fn create_volume(&self, volume: &Volume) -> Result<()>;

    /// Removes a named volume
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;

    /// Creates a network
    async fn create_network(&self, network: &Network) -> Result<()>;

    /// Removes a network
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Checks whether an image is present locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pulls an image, with registry credentials when given
    async fn pull_image(&self, image: &str, auth: Option<&AuthConfig>) -> Result<()>;

    /// Creates a container from a spec; the container is named `spec.name`
    async fn create_container(&self, spec: &ContainerSpec) -> Result<()>;

    /// Starts a created container
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Blocks until the container is no longer running
    async fn wait_container(&self, name: &str) -> Result<()>;

    /// Reads the exit status of a container
    async fn inspect_container(&self, name: &str) -> Result<ContainerStatus>;

    /// Sends a signal to a container
    async fn kill_container(&self, name: &str, signal: &str) -> Result<()>;

    /// Removes a container
    async fn remove_container(&self, name: &str, options: RemoveOptions) -> Result<()>;

    /// Streams container output into `lines` until the output ends
    ///
    /// Each chunk received from the runtime is pushed as one message. Returns
    /// when the runtime closes the stream (with `follow`, when the container
    /// exits) or when the receiving side is gone.
    async fn logs(
        &self,
        name: &str,
        options: LogOptions,
        lines: mpsc::Sender<Vec<u8>>,
    ) -> Result<()>;
}
