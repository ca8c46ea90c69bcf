//! Container log tailing
//!
//! Two tasks per tailed container:
//! - the producer runs the runtime's follow-logs call, pushing every chunk
//!   into a bounded queue, then waits for the container and fires a
//!   completion marker;
//! - the consumer forwards queued chunks into the pipe handed to the caller.
//!   Once the marker fires it drains whatever is still queued and only then
//!   closes the pipe, so output produced before exit is never dropped.

use std::sync::Arc;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::config::{LogOptions, PodmanOptions};
use super::runtime::ContainerRuntime;

/// Starts tailing a container and returns the read end of its output pipe
///
/// Returns immediately; the pipe reaches end-of-file after the container
/// has exited and all of its output has been forwarded.
pub fn spawn_tailer(
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
    options: &PodmanOptions,
) -> DuplexStream {
    let (reader, writer) = tokio::io::duplex(options.log_pipe_capacity);
    let (line_tx, line_rx) = mpsc::channel(options.log_queue_capacity);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(produce(runtime, name.clone(), options.logs, line_tx, done_tx));
    tokio::spawn(forward(name, line_rx, done_rx, writer));

    reader
}

async fn produce(
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
    options: LogOptions,
    lines: mpsc::Sender<Vec<u8>>,
    done: oneshot::Sender<()>,
) {
    if let Err(e) = runtime.logs(&name, options, lines).await {
        error!("Could not get logs for container {}: {}", name, e);
    }

    // The log call can end early; completion means the container is done.
    if let Err(e) = runtime.wait_container(&name).await {
        debug!("Wait after log stream for {} failed: {}", name, e);
    }

    let _ = done.send(());
}

async fn forward(
    name: String,
    mut lines: mpsc::Receiver<Vec<u8>>,
    mut done: oneshot::Receiver<()>,
    mut writer: DuplexStream,
) {
    loop {
        tokio::select! {
            Some(line) = lines.recv() => {
                if let Err(e) = write_line(&mut writer, &line).await {
                    debug!("Log reader for {} closed: {}", name, e);
                    return;
                }
            }
            _ = &mut done => {
                while let Ok(line) = lines.try_recv() {
                    if let Err(e) = write_line(&mut writer, &line).await {
                        debug!("Log reader for {} closed: {}", name, e);
                        return;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to close log pipe for {}: {}", name, e);
    }
    debug!("Log stream for {} finished", name);
}

async fn write_line(writer: &mut DuplexStream, line: &[u8]) -> std::io::Result<()> {
    if line.is_empty() {
        return Ok(());
    }
    writer.write_all(line).await
}
