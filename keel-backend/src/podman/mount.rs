//! Mount string parsing
//!
//! Steps declare mounts in the runtime's volume syntax:
//! - `dest` - anonymous volume
//! - `src:dest` - bind mount when `src` is a path (starts with `/` or `.`),
//!   named volume otherwise
//! - `src:dest:opt1,opt2` - same, with mount options

use std::collections::HashSet;

use super::spec::{Mount, MountSource};
use crate::error::{BackendError, Result};

/// Mutually exclusive option groups; at most one member of each may be given
const OPTION_GROUPS: &[&[&str]] = &[
    &["rw", "ro"],
    &["z", "Z"],
    &[
        "private",
        "rprivate",
        "shared",
        "rshared",
        "slave",
        "rslave",
        "unbindable",
        "runbindable",
    ],
    &["bind", "rbind"],
    &["exec", "noexec"],
    &["dev", "nodev"],
    &["suid", "nosuid"],
    &["copy", "nocopy"],
    &["U"],
    &["O"],
];

/// Parses every mount string of a step
///
/// Fails on the first malformed entry, or when two mounts share a destination.
pub fn parse_mounts(specs: &[String]) -> Result<Vec<Mount>> {
    let mut destinations = HashSet::new();
    let mut mounts = Vec::with_capacity(specs.len());

    for spec in specs {
        let mount = parse_mount(spec)?;
        if !destinations.insert(mount.destination.clone()) {
            return Err(invalid(spec, "duplicate mount destination"));
        }
        mounts.push(mount);
    }

    Ok(mounts)
}

/// Parses a single mount string
pub fn parse_mount(spec: &str) -> Result<Mount> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid(spec, "too many ':' separated parts"));
    }

    let (source, destination) = match parts.as_slice() {
        [dest] => (None, *dest),
        [src, dest, ..] => {
            if src.is_empty() {
                return Err(invalid(spec, "source cannot be empty"));
            }
            (Some(*src), *dest)
        }
        [] => return Err(invalid(spec, "empty mount spec")),
    };

    if destination.is_empty() {
        return Err(invalid(spec, "destination cannot be empty"));
    }
    if !destination.starts_with('/') {
        return Err(invalid(spec, "destination must be an absolute path"));
    }

    let options = match parts.get(2) {
        Some(opts) => validate_options(spec, opts)?,
        None => Vec::new(),
    };

    let source = match source {
        None => MountSource::Anonymous,
        Some(src) if src.starts_with('/') || src.starts_with('.') => {
            MountSource::Bind(src.to_string())
        }
        Some(name) => MountSource::Volume(name.to_string()),
    };

    Ok(Mount {
        source,
        destination: clean_path(destination),
        options,
    })
}

fn validate_options(spec: &str, options: &str) -> Result<Vec<String>> {
    let mut used_groups = HashSet::new();
    let mut validated = Vec::new();

    for option in options.split(',') {
        let group = OPTION_GROUPS
            .iter()
            .position(|group| group.contains(&option))
            .ok_or_else(|| invalid(spec, &format!("unknown mount option '{}'", option)))?;

        if !used_groups.insert(group) {
            return Err(invalid(
                spec,
                &format!(
                    "option '{}' conflicts with another of {}",
                    option,
                    OPTION_GROUPS[group].join("|")
                ),
            ));
        }
        validated.push(option.to_string());
    }

    Ok(validated)
}

/// Lexically cleans an absolute path: collapses `//`, drops `.`, resolves `..`
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn invalid(spec: &str, reason: &str) -> BackendError {
    BackendError::InvalidMountSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}
