//! Backend engine contract
//!
//! An engine executes the steps of a pipeline run on one kind of container
//! runtime. The scheduler picks an engine at startup and afterwards only
//! talks to this trait.

use async_trait::async_trait;
use keel_core::{Config, State, Step};
use tokio::io::AsyncRead;

use crate::error::Result;

/// Byte stream carrying a step's interleaved stdout/stderr
pub type LogReader = Box<dyn AsyncRead + Send + Unpin>;

/// Pipeline execution backend
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name used to select this engine
    fn name(&self) -> &str;

    /// Whether this engine can run on the current host
    fn is_available(&self) -> bool;

    /// Establishes the connection to the runtime; called once before use
    async fn load(&mut self) -> Result<()>;

    /// Creates the volumes and networks declared by a run
    ///
    /// Resources created before a failure are not rolled back; the caller
    /// is expected to call `destroy`.
    async fn setup(&self, config: &Config) -> Result<()>;

    /// Starts a step's container; returns once it is running
    async fn exec(&self, step: &Step) -> Result<()>;

    /// Forcibly terminates a step's container without removing it
    async fn kill(&self, step: &Step) -> Result<()>;

    /// Blocks until a step's container has exited and reports its state
    async fn wait(&self, step: &Step) -> Result<State>;

    /// Returns a stream of the step's output; does not wait for completion
    async fn tail(&self, step: &Step) -> Result<LogReader>;

    /// Removes every container, volume and network of a run
    ///
    /// Best effort: failures are logged per resource and never returned.
    async fn destroy(&self, config: &Config) -> Result<()>;
}
