//! In-memory runtime for tests
//!
//! Records every call in order and answers from primed state.

use async_trait::async_trait;
use keel_core::{AuthConfig, Network, Volume};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::config::{LogOptions, RemoveOptions};
use super::runtime::{ContainerRuntime, ContainerStatus};
use super::spec::ContainerSpec;
use crate::error::{BackendError, Result};

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateVolume(String),
    RemoveVolume { name: String, force: bool },
    CreateNetwork(String),
    RemoveNetwork(String),
    ImageExists(String),
    PullImage { image: String, authenticated: bool },
    CreateContainer {
        name: String,
        working_dir: String,
        entrypoint: Option<Vec<String>>,
    },
    StartContainer(String),
    WaitContainer(String),
    InspectContainer(String),
    KillContainer { name: String, signal: String },
    RemoveContainer(String),
    Logs(String),
}

pub struct RecordingRuntime {
    calls: Mutex<Vec<Call>>,
    images: HashSet<String>,
    /// operation -> resource name -> status code returned
    failures: HashMap<&'static str, HashMap<String, u16>>,
    logs: Vec<Vec<u8>>,
    status: ContainerStatus,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            images: HashSet::new(),
            failures: HashMap::new(),
            logs: Vec::new(),
            status: ContainerStatus {
                exit_code: 0,
                oom_killed: false,
            },
        }
    }

    /// Marks an image as present locally
    pub fn with_image(mut self, image: &str) -> Self {
        self.images.insert(image.to_string());
        self
    }

    /// Makes `operation` fail with a server error for `name`
    pub fn fail_on(self, operation: &'static str, name: &str) -> Self {
        self.fail_with(operation, name, 500)
    }

    /// Makes `operation` fail with the given status code for `name`
    pub fn fail_with(mut self, operation: &'static str, name: &str, status: u16) -> Self {
        self.failures
            .entry(operation)
            .or_default()
            .insert(name.to_string(), status);
        self
    }

    /// Output the logs call will emit
    pub fn with_logs(mut self, lines: &[String]) -> Self {
        self.logs = lines.iter().map(|l| l.as_bytes().to_vec()).collect();
        self
    }

    /// Status reported by inspect
    pub fn with_status(mut self, exit_code: i64, oom_killed: bool) -> Self {
        self.status = ContainerStatus {
            exit_code,
            oom_killed,
        };
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, name: &str, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);

        match self.failures.get(operation).and_then(|names| names.get(name)) {
            Some(status) => Err(BackendError::api_error(
                *status,
                format!("simulated {} failure for {}", operation, name),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn create_volume(&self, volume: &Volume) -> Result<()> {
        self.record(
            "create_volume",
            &volume.name,
            Call::CreateVolume(volume.name.clone()),
        )
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.record(
            "remove_volume",
            name,
            Call::RemoveVolume {
                name: name.to_string(),
                force,
            },
        )
    }

    async fn create_network(&self, network: &Network) -> Result<()> {
        self.record(
            "create_network",
            &network.name,
            Call::CreateNetwork(network.name.clone()),
        )
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.record("remove_network", name, Call::RemoveNetwork(name.to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record("image_exists", image, Call::ImageExists(image.to_string()))?;
        Ok(self.images.contains(image))
    }

    async fn pull_image(&self, image: &str, auth: Option<&AuthConfig>) -> Result<()> {
        self.record(
            "pull_image",
            image,
            Call::PullImage {
                image: image.to_string(),
                authenticated: auth.is_some(),
            },
        )
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.record(
            "create_container",
            &spec.name,
            Call::CreateContainer {
                name: spec.name.clone(),
                working_dir: spec.working_dir.clone(),
                entrypoint: spec.entrypoint.clone(),
            },
        )
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.record("start_container", name, Call::StartContainer(name.to_string()))
    }

    async fn wait_container(&self, name: &str) -> Result<()> {
        self.record("wait_container", name, Call::WaitContainer(name.to_string()))
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerStatus> {
        self.record(
            "inspect_container",
            name,
            Call::InspectContainer(name.to_string()),
        )?;
        Ok(self.status)
    }

    async fn kill_container(&self, name: &str, signal: &str) -> Result<()> {
        self.record(
            "kill_container",
            name,
            Call::KillContainer {
                name: name.to_string(),
                signal: signal.to_string(),
            },
        )
    }

    async fn remove_container(&self, name: &str, _options: RemoveOptions) -> Result<()> {
        self.record(
            "remove_container",
            name,
            Call::RemoveContainer(name.to_string()),
        )
    }

    async fn logs(
        &self,
        name: &str,
        _options: LogOptions,
        lines: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        self.record("logs", name, Call::Logs(name.to_string()))?;
        for line in &self.logs {
            if lines.send(line.clone()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
