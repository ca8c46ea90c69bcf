//! Pipeline service
//!
//! Drives one engine through a whole run:
//! - Creating the run's volumes and networks
//! - Executing steps stage by stage, in file order
//! - Copying each step's output to the output sink
//! - Tearing everything down, whatever happened before
//!
//! A run can be cancelled from outside; the step in flight is killed and
//! teardown still happens.

use anyhow::{Context, Result};
use std::future::Future;
use keel_backend::Engine;
use keel_core::{Config, State, Step};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    /// Step that stopped the run, if any
    pub failed_step: Option<String>,
    pub exit_code: i32,
    pub error_message: Option<String>,
}

impl RunResult {
    fn success() -> Self {
        Self {
            success: true,
            failed_step: None,
            exit_code: 0,
            error_message: None,
        }
    }

    fn failure(step: Option<&str>, exit_code: i32, message: String) -> Self {
        Self {
            success: false,
            failed_step: step.map(str::to_string),
            exit_code,
            error_message: Some(message),
        }
    }
}

/// Exit code reported for a cancelled run (128 + SIGINT)
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Runs pipelines on an engine, writing step output to `out`
pub struct PipelineService<'a, W> {
    engine: &'a dyn Engine,
    out: W,
    /// Step between exec and wait, killed on cancellation
    current: Option<Step>,
}

impl<'a, W> PipelineService<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a service for a loaded engine
    pub fn new(engine: &'a dyn Engine, out: W) -> Self {
        Self {
            engine,
            out,
            current: None,
        }
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.out
    }

    /// Runs every step of a pipeline
    ///
    /// The first failing step stops the run. Resources are destroyed exactly
    /// once at the end, also when setup failed.
    #[cfg(test)]
    pub async fn run(&mut self, config: &Config) -> RunResult {
        self.run_until(config, std::future::pending()).await
    }

    /// Runs every step of a pipeline until `cancel` completes
    ///
    /// On cancellation the step in flight is killed before teardown, so its
    /// container reaches a terminal state and can be removed.
    pub async fn run_until<F>(&mut self, config: &Config, cancel: F) -> RunResult
    where
        F: Future<Output = ()>,
    {
        info!(
            "Running pipeline: {} stage(s), {} step(s) on {}",
            config.stages.len(),
            config.steps().count(),
            self.engine.name()
        );

        let finished = tokio::select! {
            biased;
            _ = cancel => None,
            result = self.run_stages(config) => Some(result),
        };

        let result = match finished {
            Some(result) => result,
            None => self.cancel_current().await,
        };

        if let Err(e) = self.engine.destroy(config).await {
            error!("Failed to destroy pipeline resources: {}", e);
        }

        if result.success {
            info!("Pipeline completed successfully");
        } else {
            error!(
                "Pipeline failed: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        result
    }

    async fn run_stages(&mut self, config: &Config) -> RunResult {
        if let Err(e) = self.engine.setup(config).await {
            return RunResult::failure(None, 1, format!("Setup failed: {}", e));
        }

        for stage in &config.stages {
            debug!("Executing stage: {}", stage.name);

            for step in &stage.steps {
                let state = match self.run_step(step).await {
                    Ok(state) => state,
                    Err(e) => {
                        return RunResult::failure(Some(&step.name), 1, format!("{:#}", e));
                    }
                };

                if !state.is_success() {
                    let message = if state.oom_killed {
                        format!("Step '{}' was killed (out of memory)", step.name)
                    } else {
                        format!("Step '{}' exited with code {}", step.name, state.exit_code)
                    };
                    let exit_code = if state.exit_code != 0 { state.exit_code } else { 1 };
                    return RunResult::failure(Some(&step.name), exit_code, message);
                }
            }

            debug!("Stage '{}' completed successfully", stage.name);
        }

        RunResult::success()
    }

    async fn cancel_current(&mut self) -> RunResult {
        let Some(step) = self.current.take() else {
            warn!("Pipeline cancelled");
            return RunResult::failure(
                None,
                CANCELLED_EXIT_CODE,
                "Pipeline cancelled".to_string(),
            );
        };

        warn!("Pipeline cancelled, killing step '{}'", step.name);
        if let Err(e) = self.engine.kill(&step).await {
            error!("Failed to kill step '{}': {}", step.name, e);
        }

        RunResult::failure(
            Some(&step.name),
            CANCELLED_EXIT_CODE,
            format!("Pipeline cancelled during step '{}'", step.name),
        )
    }

    async fn run_step(&mut self, step: &Step) -> Result<State> {
        info!("Starting step '{}' ({})", step.name, step.image);
        self.current = Some(step.clone());

        self.engine
            .exec(step)
            .await
            .with_context(|| format!("Failed to start step '{}'", step.name))?;

        match self.engine.tail(step).await {
            Ok(reader) => {
                if let Err(e) = self.copy_output(&step.name, reader).await {
                    warn!("Output of step '{}' was cut short: {}", step.name, e);
                }
            }
            Err(e) => warn!("Could not tail step '{}': {}", step.name, e),
        }

        let state = self
            .engine
            .wait(step)
            .await
            .with_context(|| format!("Failed to wait for step '{}'", step.name))?;
        self.current = None;

        info!(
            "Step '{}' finished with exit code {}",
            step.name, state.exit_code
        );
        Ok(state)
    }

    /// Copies output line by line, prefixing each with the step name
    ///
    /// Bytes that are not UTF-8 are replaced rather than ending the copy.
    async fn copy_output(&mut self, step: &str, reader: keel_backend::LogReader) -> Result<()> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            self.out
                .write_all(format!("[{}] {}\n", step, line).as_bytes())
                .await?;
        }

        self.out.flush().await?;
        Ok(())
    }
}
