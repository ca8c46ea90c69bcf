//! Namespace mode parsing

use std::fmt;
use std::str::FromStr;

use crate::error::BackendError;

/// How a container joins a kernel namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    Host,
    Private,
    Shareable,
    None,
    FromPod,
    FromContainer(String),
    Path(String),
}

impl FromStr for Namespace {
    type Err = BackendError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| BackendError::InvalidNamespace {
            mode: mode.to_string(),
            reason: reason.to_string(),
        };

        match mode {
            "" | "private" => Ok(Self::Private),
            "host" => Ok(Self::Host),
            "shareable" => Ok(Self::Shareable),
            "none" => Ok(Self::None),
            "pod" => Ok(Self::FromPod),
            _ => {
                if let Some(path) = mode.strip_prefix("ns:") {
                    if path.is_empty() {
                        return Err(invalid("a namespace path is required after \"ns:\""));
                    }
                    Ok(Self::Path(path.to_string()))
                } else if let Some(container) = mode.strip_prefix("container:") {
                    if container.is_empty() {
                        return Err(invalid(
                            "a container name or ID is required after \"container:\"",
                        ));
                    }
                    Ok(Self::FromContainer(container.to_string()))
                } else {
                    Err(invalid("unrecognized namespace mode"))
                }
            }
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Private => f.write_str("private"),
            Self::Shareable => f.write_str("shareable"),
            Self::None => f.write_str("none"),
            Self::FromPod => f.write_str("pod"),
            Self::FromContainer(id) => write!(f, "container:{}", id),
            Self::Path(path) => write!(f, "ns:{}", path),
        }
    }
}
