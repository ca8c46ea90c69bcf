//! Podman engine
//!
//! Runs each step as a privileged container on a podman service:
//! - Creating the run's volumes and networks
//! - Making sure the step image is present (pulling when needed)
//! - Preparing the working directory, then starting the real container
//! - Reporting exit state and streaming output
//! - Tearing down every container, volume and network of the run

use async_trait::async_trait;
use keel_core::{Config, State, Step};
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::config::PodmanOptions;
use super::connection::BollardRuntime;
use super::convert::to_container_spec;
use super::runtime::ContainerRuntime;
use super::spec::ContainerSpec;
use super::tail::spawn_tailer;
use crate::engine::{Engine, LogReader};
use crate::error::{BackendError, Result};

/// Engine name used for selection
pub const PODMAN: &str = "podman";

/// Engine backed by a podman API socket
pub struct PodmanEngine {
    options: PodmanOptions,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl PodmanEngine {
    /// Creates an engine; `load` connects it
    pub fn new(options: PodmanOptions) -> Self {
        Self {
            options,
            runtime: None,
        }
    }

    /// Creates an engine already bound to a runtime
    pub fn with_runtime(options: PodmanOptions, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            options,
            runtime: Some(runtime),
        }
    }

    fn runtime(&self) -> Result<&Arc<dyn ContainerRuntime>> {
        self.runtime.as_ref().ok_or(BackendError::NotLoaded)
    }

    /// Pulls the step image when the policy asks for it or it is missing
    ///
    /// A failed anonymous pull falls back to whatever image is present
    /// locally; a failed pull with a password is an access problem and fails.
    async fn ensure_image(&self, runtime: &dyn ContainerRuntime, step: &Step) -> Result<()> {
        let auth = step
            .auth_config
            .is_complete()
            .then_some(&step.auth_config);

        let mut pull = step.pull.is_always();
        if !pull && !runtime.image_exists(&step.image).await? {
            debug!("Image {} not present, pulling", step.image);
            pull = true;
        }

        if !pull {
            return Ok(());
        }

        if let Err(e) = runtime.pull_image(&step.image, auth).await {
            if !step.auth_config.password.is_empty() {
                return Err(BackendError::Pull {
                    image: step.image.clone(),
                    source: Box::new(e),
                });
            }
            warn!(
                "Failed to pull image {} for step {}, continuing with local image: {}",
                step.image, step.name, e
            );
        }

        Ok(())
    }

    /// Creates the step's working directory with a throwaway container
    ///
    /// The runtime does not create a missing working directory, so a first
    /// container with the same name runs `mkdir -p` from `/`. It is waited for
    /// and removed before the caller creates the real container.
    async fn prepare_workdir(
        &self,
        runtime: &dyn ContainerRuntime,
        spec: &mut ContainerSpec,
    ) -> Result<()> {
        let working_dir = std::mem::replace(&mut spec.working_dir, "/".to_string());
        let entrypoint = spec.entrypoint.replace(vec![
            "mkdir".to_string(),
            "-p".to_string(),
            working_dir.clone(),
        ]);

        debug!("Preparing working directory {} for {}", working_dir, spec.name);
        runtime.create_container(spec).await?;
        runtime.start_container(&spec.name).await?;
        runtime.wait_container(&spec.name).await?;
        runtime
            .remove_container(&spec.name, self.options.remove)
            .await?;

        spec.working_dir = working_dir;
        spec.entrypoint = entrypoint;
        Ok(())
    }
}

#[async_trait]
impl Engine for PodmanEngine {
    fn name(&self) -> &str {
        PODMAN
    }

    fn is_available(&self) -> bool {
        // Meant to run on the host, never nested inside a container.
        matches!(
            std::fs::metadata(&self.options.container_marker),
            Err(e) if e.kind() == ErrorKind::NotFound
        )
    }

    async fn load(&mut self) -> Result<()> {
        self.options.validate()?;

        let runtime = BollardRuntime::connect(&self.options).await?;
        self.runtime = Some(Arc::new(runtime));

        info!("Podman engine loaded ({})", self.options.socket.display());
        Ok(())
    }

    async fn setup(&self, config: &Config) -> Result<()> {
        let runtime = self.runtime()?;

        for volume in &config.volumes {
            debug!("Creating volume {}", volume.name);
            runtime.create_volume(volume).await.map_err(|e| {
                if e.is_conflict() {
                    BackendError::AlreadyExists {
                        kind: "volume",
                        name: volume.name.clone(),
                    }
                } else {
                    e
                }
            })?;
        }

        for network in &config.networks {
            debug!("Creating network {}", network.name);
            runtime.create_network(network).await.map_err(|e| {
                if e.is_conflict() {
                    BackendError::AlreadyExists {
                        kind: "network",
                        name: network.name.clone(),
                    }
                } else {
                    e
                }
            })?;
        }

        info!(
            "Setup complete: {} volume(s), {} network(s)",
            config.volumes.len(),
            config.networks.len()
        );
        Ok(())
    }

    async fn exec(&self, step: &Step) -> Result<()> {
        let runtime = self.runtime()?;
        let mut spec = to_container_spec(step)?;

        self.ensure_image(runtime.as_ref(), step).await?;
        self.prepare_workdir(runtime.as_ref(), &mut spec).await?;

        runtime.create_container(&spec).await?;
        runtime.start_container(&spec.name).await?;

        info!("Started container {} ({})", spec.name, spec.image);
        Ok(())
    }

    async fn kill(&self, step: &Step) -> Result<()> {
        let runtime = self.runtime()?;
        runtime
            .kill_container(&step.name, &self.options.kill_signal)
            .await
    }

    async fn wait(&self, step: &Step) -> Result<State> {
        let runtime = self.runtime()?;

        runtime.wait_container(&step.name).await?;
        let status = runtime.inspect_container(&step.name).await?;

        debug!(
            "Container {} exited with code {} (oom_killed={})",
            step.name, status.exit_code, status.oom_killed
        );

        Ok(State::exited(status.exit_code as i32, status.oom_killed))
    }

    async fn tail(&self, step: &Step) -> Result<LogReader> {
        let runtime = self.runtime()?;
        let reader = spawn_tailer(Arc::clone(runtime), step.name.clone(), &self.options);
        Ok(Box::new(reader))
    }

    async fn destroy(&self, config: &Config) -> Result<()> {
        let runtime = self.runtime()?;

        for step in config.steps() {
            if let Err(e) = runtime
                .kill_container(&step.name, &self.options.kill_signal)
                .await
            {
                error!("Could not kill container '{}': {}", step.name, e);
            }
            if let Err(e) = runtime
                .remove_container(&step.name, self.options.remove)
                .await
            {
                error!("Could not remove container '{}': {}", step.name, e);
            }
        }

        for volume in &config.volumes {
            if let Err(e) = runtime
                .remove_volume(&volume.name, self.options.volume_remove_force)
                .await
            {
                error!("Could not remove volume '{}': {}", volume.name, e);
            }
        }

        for network in &config.networks {
            if let Err(e) = runtime.remove_network(&network.name).await {
                error!("Could not remove network '{}': {}", network.name, e);
            }
        }

        info!("Destroyed resources for {} step(s)", config.steps().count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::podman::testing::{Call, RecordingRuntime};
    use keel_core::{AuthConfig, Network, PullPolicy, Stage, Volume};
    use std::path::PathBuf;

    fn engine_with(runtime: RecordingRuntime) -> (PodmanEngine, Arc<RecordingRuntime>) {
        let runtime = Arc::new(runtime);
        let engine = PodmanEngine::with_runtime(
            PodmanOptions::new("/tmp/podman.sock"),
            runtime.clone(),
        );
        (engine, runtime)
    }

    fn volume(name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            driver: "local".to_string(),
            ..Default::default()
        }
    }

    fn network(name: &str) -> Network {
        Network {
            name: name.to_string(),
            driver: "bridge".to_string(),
            ..Default::default()
        }
    }

    fn create(name: &str, working_dir: &str, entrypoint: &[&str]) -> Call {
        Call::CreateContainer {
            name: name.to_string(),
            working_dir: working_dir.to_string(),
            entrypoint: Some(entrypoint.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn pulls(calls: &[Call]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, Call::PullImage { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_setup_creates_volumes_then_networks_in_order() {
        let (engine, runtime) = engine_with(RecordingRuntime::new());
        let config = Config {
            volumes: vec![volume("v1"), volume("v2")],
            networks: vec![network("n1"), network("n2")],
            ..Default::default()
        };

        engine.setup(&config).await.unwrap();

        assert_eq!(
            runtime.calls(),
            vec![
                Call::CreateVolume("v1".to_string()),
                Call::CreateVolume("v2".to_string()),
                Call::CreateNetwork("n1".to_string()),
                Call::CreateNetwork("n2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_setup_stops_at_first_failure() {
        let (engine, runtime) =
            engine_with(RecordingRuntime::new().fail_on("create_volume", "v1"));
        let config = Config {
            volumes: vec![volume("v1"), volume("v2")],
            networks: vec![network("n1")],
            ..Default::default()
        };

        let err = engine.setup(&config).await.unwrap_err();

        assert!(matches!(err, BackendError::Api { status: 500, .. }));
        assert_eq!(runtime.calls(), vec![Call::CreateVolume("v1".to_string())]);
    }

    #[tokio::test]
    async fn test_setup_reports_existing_volume() {
        let (engine, runtime) =
            engine_with(RecordingRuntime::new().fail_with("create_volume", "cache", 409));
        let config = Config {
            volumes: vec![volume("cache")],
            networks: vec![network("n1")],
            ..Default::default()
        };

        let err = engine.setup(&config).await.unwrap_err();

        match err {
            BackendError::AlreadyExists { kind, name } => {
                assert_eq!(kind, "volume");
                assert_eq!(name, "cache");
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        assert_eq!(runtime.calls(), vec![Call::CreateVolume("cache".to_string())]);
    }

    #[tokio::test]
    async fn test_setup_reports_existing_network() {
        let (engine, _runtime) =
            engine_with(RecordingRuntime::new().fail_with("create_network", "n1", 409));
        let config = Config {
            networks: vec![network("n1")],
            ..Default::default()
        };

        let err = engine.setup(&config).await.unwrap_err();

        match err {
            BackendError::AlreadyExists { kind, name } => {
                assert_eq!(kind, "network");
                assert_eq!(name, "n1");
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_runs_workdir_container_before_real_one() {
        let (engine, runtime) = engine_with(RecordingRuntime::new().with_image("alpine"));
        let mut step = Step::new("build", "alpine");
        step.working_dir = "/build".to_string();
        step.entrypoint = vec!["run.sh".to_string()];

        engine.exec(&step).await.unwrap();

        assert_eq!(
            runtime.calls(),
            vec![
                Call::ImageExists("alpine".to_string()),
                create("build", "/", &["mkdir", "-p", "/build"]),
                Call::StartContainer("build".to_string()),
                Call::WaitContainer("build".to_string()),
                Call::RemoveContainer("build".to_string()),
                create("build", "/build", &["run.sh"]),
                Call::StartContainer("build".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_exec_restores_image_default_entrypoint() {
        let (engine, runtime) = engine_with(RecordingRuntime::new().with_image("alpine"));
        let mut step = Step::new("build", "alpine");
        step.working_dir = "/src".to_string();

        engine.exec(&step).await.unwrap();

        let calls = runtime.calls();
        assert_eq!(
            calls[5],
            Call::CreateContainer {
                name: "build".to_string(),
                working_dir: "/src".to_string(),
                entrypoint: None,
            }
        );
    }

    #[tokio::test]
    async fn test_exec_skips_pull_for_present_image() {
        let (engine, runtime) = engine_with(RecordingRuntime::new().with_image("alpine"));

        engine.exec(&Step::new("a", "alpine")).await.unwrap();

        assert_eq!(pulls(&runtime.calls()), 0);
    }

    #[tokio::test]
    async fn test_exec_pulls_missing_image() {
        let (engine, runtime) = engine_with(RecordingRuntime::new());

        engine.exec(&Step::new("a", "alpine")).await.unwrap();

        let calls = runtime.calls();
        assert_eq!(calls[0], Call::ImageExists("alpine".to_string()));
        assert_eq!(
            calls[1],
            Call::PullImage {
                image: "alpine".to_string(),
                authenticated: false
            }
        );
    }

    #[tokio::test]
    async fn test_exec_always_pulls_without_checking() {
        let (engine, runtime) = engine_with(RecordingRuntime::new().with_image("alpine"));
        let mut step = Step::new("a", "alpine");
        step.pull = PullPolicy::Always;

        engine.exec(&step).await.unwrap();

        let calls = runtime.calls();
        assert!(!calls.contains(&Call::ImageExists("alpine".to_string())));
        assert_eq!(pulls(&calls), 1);
    }

    #[tokio::test]
    async fn test_exec_tolerates_anonymous_pull_failure() {
        let (engine, runtime) =
            engine_with(RecordingRuntime::new().fail_on("pull_image", "alpine"));

        engine.exec(&Step::new("a", "alpine")).await.unwrap();

        assert_eq!(
            runtime.calls().last(),
            Some(&Call::StartContainer("a".to_string()))
        );
    }

    #[tokio::test]
    async fn test_exec_fails_on_authenticated_pull_failure() {
        let (engine, runtime) =
            engine_with(RecordingRuntime::new().fail_with("pull_image", "private/app", 401));
        let mut step = Step::new("a", "private/app");
        step.auth_config = AuthConfig {
            username: "ci".to_string(),
            password: "secret".to_string(),
        };

        let err = engine.exec(&step).await.unwrap_err();

        assert!(matches!(err, BackendError::Pull { .. }));
        let calls = runtime.calls();
        assert_eq!(
            calls.last(),
            Some(&Call::PullImage {
                image: "private/app".to_string(),
                authenticated: true
            })
        );
    }

    #[tokio::test]
    async fn test_exec_password_without_username_is_still_fatal() {
        let (engine, runtime) =
            engine_with(RecordingRuntime::new().fail_on("pull_image", "app"));
        let mut step = Step::new("a", "app");
        step.auth_config.password = "secret".to_string();

        let err = engine.exec(&step).await.unwrap_err();

        assert!(matches!(err, BackendError::Pull { .. }));
        assert!(runtime.calls().contains(&Call::PullImage {
            image: "app".to_string(),
            authenticated: false
        }));
    }

    #[tokio::test]
    async fn test_exec_translation_failure_makes_no_calls() {
        let (engine, runtime) = engine_with(RecordingRuntime::new());
        let mut step = Step::new("a", "alpine");
        step.volumes = vec!["a:b:c:d".to_string()];

        let err = engine.exec(&step).await.unwrap_err();

        assert!(err.is_translation());
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exec_stops_when_workdir_container_fails() {
        let (engine, runtime) = engine_with(
            RecordingRuntime::new()
                .with_image("alpine")
                .fail_on("wait_container", "a"),
        );

        assert!(engine.exec(&Step::new("a", "alpine")).await.is_err());

        let starts = runtime
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::StartContainer(_)))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn test_kill_sends_sigkill_only() {
        let (engine, runtime) = engine_with(RecordingRuntime::new());

        engine.kill(&Step::new("a", "alpine")).await.unwrap();

        assert_eq!(
            runtime.calls(),
            vec![Call::KillContainer {
                name: "a".to_string(),
                signal: "SIGKILL".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_wait_reports_exit_state() {
        let (engine, runtime) = engine_with(RecordingRuntime::new().with_status(137, true));

        let state = engine.wait(&Step::new("a", "alpine")).await.unwrap();

        assert_eq!(state, State::exited(137, true));
        assert_eq!(
            runtime.calls(),
            vec![
                Call::WaitContainer("a".to_string()),
                Call::InspectContainer("a".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_propagates_inspect_error() {
        let (engine, _runtime) =
            engine_with(RecordingRuntime::new().fail_with("inspect_container", "a", 404));

        let err = engine.wait(&Step::new("a", "alpine")).await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_destroy_continues_past_failures() {
        let (engine, runtime) = engine_with(
            RecordingRuntime::new()
                .fail_on("kill_container", "s1")
                .fail_on("remove_container", "s2")
                .fail_on("remove_volume", "cache"),
        );
        let config = Config {
            stages: vec![
                Stage::new("one", vec![Step::new("s1", "a"), Step::new("s2", "a")]),
                Stage::new("two", vec![Step::new("s3", "a"), Step::new("s4", "a")]),
            ],
            volumes: vec![volume("cache")],
            networks: vec![network("net")],
        };

        engine.destroy(&config).await.unwrap();

        let mut expected = Vec::new();
        for name in ["s1", "s2", "s3", "s4"] {
            expected.push(Call::KillContainer {
                name: name.to_string(),
                signal: "SIGKILL".to_string(),
            });
            expected.push(Call::RemoveContainer(name.to_string()));
        }
        expected.push(Call::RemoveVolume {
            name: "cache".to_string(),
            force: true,
        });
        expected.push(Call::RemoveNetwork("net".to_string()));

        assert_eq!(runtime.calls(), expected);
    }

    #[tokio::test]
    async fn test_operations_require_load() {
        let engine = PodmanEngine::new(PodmanOptions::new("/tmp/podman.sock"));
        let step = Step::new("a", "alpine");

        assert!(matches!(
            engine.exec(&step).await,
            Err(BackendError::NotLoaded)
        ));
        assert!(matches!(
            engine.wait(&step).await,
            Err(BackendError::NotLoaded)
        ));
        assert!(matches!(
            engine.destroy(&Config::default()).await,
            Err(BackendError::NotLoaded)
        ));
    }

    #[test]
    fn test_availability_follows_container_marker() {
        let mut options = PodmanOptions::new("/tmp/podman.sock");

        options.container_marker = PathBuf::from("/nonexistent/keel/.containerenv");
        assert!(PodmanEngine::new(options.clone()).is_available());

        options.container_marker = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        assert!(!PodmanEngine::new(options).is_available());
    }

    #[test]
    fn test_engine_name() {
        let engine = PodmanEngine::new(PodmanOptions::new("/tmp/podman.sock"));
        assert_eq!(engine.name(), "podman");
    }
}
