//! Step to container specification translation

use keel_core::Step;
use std::net::IpAddr;
use tracing::{trace, warn};

use super::mount::parse_mounts;
use super::namespace::Namespace;
use super::spec::{ContainerSpec, LogConfig};
use crate::error::Result;

/// Translates a step into a container specification
///
/// Empty environment, command, entrypoint and mounts keep the image
/// defaults. DNS servers that are not IP literals are dropped rather than
/// rejected; the remaining ones keep their order.
pub fn to_container_spec(step: &Step) -> Result<ContainerSpec> {
    let mut spec = ContainerSpec {
        image: step.image.clone(),
        name: step.name.clone(),
        labels: step.labels.clone(),
        working_dir: step.working_dir.clone(),
        terminal: true,
        log_config: LogConfig::default(),
        // Build steps (docker-in-docker, buildah) need it; not configurable.
        privileged: true,
        shm_size: step.shm_size,
        sysctls: step.sysctls.clone(),
        ..Default::default()
    };

    if !step.environment.is_empty() {
        spec.env = Some(step.environment.clone());
    }
    if !step.command.is_empty() {
        spec.command = Some(step.command.clone());
    }
    if !step.entrypoint.is_empty() {
        spec.entrypoint = Some(step.entrypoint.clone());
    }

    if !step.volumes.is_empty() {
        trace!("step {} volumes: {:?}", step.name, step.volumes);
        spec.mounts = parse_mounts(&step.volumes)?;
    }

    if !step.ipc_mode.is_empty() {
        spec.ipc = Some(step.ipc_mode.parse::<Namespace>()?);
    }

    spec.dns_servers = step
        .dns
        .iter()
        .filter_map(|server| match server.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!(
                    "Ignoring DNS server '{}' for step {}: not an IP address",
                    server, step.name
                );
                None
            }
        })
        .collect();

    if !step.dns_search.is_empty() {
        spec.dns_search = step.dns_search.clone();
    }
    if !step.extra_hosts.is_empty() {
        spec.extra_hosts = step.extra_hosts.clone();
    }

    trace!("container spec for step {}: {:?}", step.name, spec);

    Ok(spec)
}
