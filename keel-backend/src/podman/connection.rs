//! Runtime connection over the podman API socket
//!
//! Podman serves a Docker-compatible API; calls go through `bollard` on a
//! single long-lived client shared by all operations. There is no
//! reconnect: a broken connection surfaces as an error on the next call.

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    KillContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, HostConfigLogConfig, Mount as ApiMount, MountTypeEnum};
use bollard::network::CreateNetworkOptions;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::StreamExt;
use keel_core::{AuthConfig, Network, Volume};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::config::{LogOptions, PodmanOptions, RemoveOptions};
use super::runtime::{ContainerRuntime, ContainerStatus};
use super::spec::{ContainerSpec, MountSource};
use crate::error::{BackendError, Result};

impl From<BollardError> for BackendError {
    fn from(err: BollardError) -> Self {
        match err {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => BackendError::Api {
                status: status_code,
                message,
            },
            other => BackendError::Connection(other.to_string()),
        }
    }
}

/// Container runtime reached through the podman API socket
#[derive(Debug, Clone)]
pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    /// Connects to the socket configured in `options`
    ///
    /// Negotiates the API version, which also verifies the service answers.
    pub async fn connect(options: &PodmanOptions) -> Result<Self> {
        let socket = options.socket.to_str().ok_or_else(|| {
            BackendError::InvalidOptions("socket path must be valid UTF-8".to_string())
        })?;

        let docker = Docker::connect_with_unix(
            socket,
            options.connect_timeout.as_secs(),
            API_DEFAULT_VERSION,
        )?
        .negotiate_version()
        .await?;

        info!("Connected to container runtime at {}", socket);
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn create_volume(&self, volume: &Volume) -> Result<()> {
        let options = CreateVolumeOptions {
            name: volume.name.clone(),
            driver: volume.driver.clone(),
            driver_opts: volume.driver_opts.clone(),
            labels: HashMap::new(),
        };

        let created = self.docker.create_volume(options).await?;
        trace!("volume created: {}", created.name);
        Ok(())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await?;
        Ok(())
    }

    async fn create_network(&self, network: &Network) -> Result<()> {
        let options = CreateNetworkOptions {
            name: network.name.clone(),
            driver: network.driver.clone(),
            options: network.driver_opts.clone(),
            ..Default::default()
        };

        self.docker.create_network(options).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.docker.remove_network(name).await?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str, auth: Option<&AuthConfig>) -> Result<()> {
        let options = CreateImageOptions {
            from_image: normalize_image(image),
            ..Default::default()
        };
        let credentials = auth.map(|auth| DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            ..Default::default()
        });

        let mut progress =
            std::pin::pin!(self.docker.create_image(Some(options), None, credentials));
        while let Some(info) = progress.next().await {
            let info = info?;
            if let Some(status) = info.status {
                trace!("pull {}: {}", image, status);
            }
        }

        debug!("Pulled image {}", image);
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await?;
        for warning in created.warnings {
            debug!("create {}: {}", spec.name, warning);
        }
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, name: &str) -> Result<()> {
        let mut responses =
            std::pin::pin!(self.docker.wait_container(name, None::<WaitContainerOptions<String>>));

        while let Some(response) = responses.next().await {
            match response {
                Ok(_) => {}
                // Non-zero exit: still a terminal state, inspect reports the code.
                Err(BollardError::DockerContainerWaitError { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerStatus> {
        let info = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        let state = info.state.ok_or_else(|| {
            BackendError::InvalidResponse(format!("container '{}' has no state", name))
        })?;
        let exit_code = state.exit_code.ok_or_else(|| {
            BackendError::InvalidResponse(format!("container '{}' has no exit code", name))
        })?;

        Ok(ContainerStatus {
            exit_code,
            oom_killed: state.oom_killed.unwrap_or(false),
        })
    }

    async fn kill_container(&self, name: &str, signal: &str) -> Result<()> {
        self.docker
            .kill_container(
                name,
                Some(KillContainerOptions {
                    signal: signal.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str, options: RemoveOptions) -> Result<()> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    v: options.volumes,
                    force: options.force,
                    link: false,
                }),
            )
            .await?;
        Ok(())
    }

    async fn logs(
        &self,
        name: &str,
        options: LogOptions,
        lines: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        let options = LogsOptions::<String> {
            follow: options.follow,
            stdout: options.stdout,
            stderr: options.stderr,
            timestamps: options.timestamps,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut output = std::pin::pin!(self.docker.logs(name, Some(options)));
        while let Some(chunk) = output.next().await {
            let bytes = chunk?.into_bytes();
            if lines.send(bytes.to_vec()).await.is_err() {
                debug!("Log receiver for {} is gone, stopping", name);
                break;
            }
        }
        Ok(())
    }
}

/// Adds the `latest` tag to untagged references so a pull does not fetch every tag
fn normalize_image(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if last_segment.contains(':') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Renders a container spec into the API's create-container body
fn container_config(spec: &ContainerSpec) -> ContainerConfig<String> {
    let mut binds = Vec::new();
    let mut mounts = Vec::new();
    for mount in &spec.mounts {
        match mount.source {
            MountSource::Anonymous => mounts.push(ApiMount {
                target: Some(mount.destination.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(mount.is_read_only()),
                ..Default::default()
            }),
            MountSource::Bind(_) | MountSource::Volume(_) => binds.push(mount.to_string()),
        }
    }

    let env = spec.env.as_ref().map(|env| {
        let mut vars: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        vars.sort();
        vars
    });

    let host_config = HostConfig {
        binds: non_empty(binds),
        mounts: non_empty(mounts),
        privileged: Some(spec.privileged),
        shm_size: (spec.shm_size > 0).then_some(spec.shm_size),
        sysctls: (!spec.sysctls.is_empty()).then(|| spec.sysctls.clone()),
        ipc_mode: spec.ipc.as_ref().map(|ns| ns.to_string()),
        dns: non_empty(spec.dns_servers.iter().map(|ip| ip.to_string()).collect()),
        dns_search: non_empty(spec.dns_search.clone()),
        extra_hosts: non_empty(spec.extra_hosts.clone()),
        log_config: spec
            .log_config
            .driver
            .as_ref()
            .map(|driver| HostConfigLogConfig {
                typ: Some(driver.clone()),
                config: Some(spec.log_config.options.clone()),
            }),
        ..Default::default()
    };

    ContainerConfig {
        image: Some(spec.image.clone()),
        labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
        working_dir: (!spec.working_dir.is_empty()).then(|| spec.working_dir.clone()),
        env,
        cmd: spec.command.clone(),
        entrypoint: spec.entrypoint.clone(),
        tty: Some(spec.terminal),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}
