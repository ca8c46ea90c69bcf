//! Podman backend
//!
//! Talks to podman through its Docker-compatible API socket.

mod config;
mod connection;
mod convert;
mod engine;
mod mount;
mod namespace;
mod runtime;
mod spec;
mod tail;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CONTAINER_MARKER, LogOptions, PodmanOptions, ROOTFUL_SOCKET, RemoveOptions};
pub use connection::BollardRuntime;
pub use convert::to_container_spec;
pub use engine::{PODMAN, PodmanEngine};
pub use mount::{parse_mount, parse_mounts};
pub use namespace::Namespace;
pub use runtime::{ContainerRuntime, ContainerStatus};
pub use spec::{ContainerSpec, LogConfig, Mount, MountSource};
