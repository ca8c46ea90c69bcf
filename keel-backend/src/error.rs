//! Error types for backend engines

use thiserror::Error;

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while driving a container runtime
#[derive(Debug, Error)]
pub enum BackendError {
    /// A volume string could not be parsed into a mount
    #[error("invalid mount spec '{spec}': {reason}")]
    InvalidMountSpec {
        /// The mount string as written in the step
        spec: String,
        /// Why it was rejected
        reason: String,
    },

    /// A namespace mode string could not be parsed
    #[error("invalid namespace mode '{mode}': {reason}")]
    InvalidNamespace {
        /// The namespace mode as written in the step
        mode: String,
        /// Why it was rejected
        reason: String,
    },

    /// Engine options failed validation
    #[error("invalid engine options: {0}")]
    InvalidOptions(String),

    /// The engine was used before `load` established a connection
    #[error("engine is not loaded")]
    NotLoaded,

    /// The runtime endpoint could not be reached
    #[error("runtime connection failed: {0}")]
    Connection(String),

    /// The runtime API returned an error status code
    #[error("runtime API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the runtime
        message: String,
    },

    /// The runtime answered with something we cannot use
    #[error("invalid runtime response: {0}")]
    InvalidResponse(String),

    /// A volume or network with this name already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Resource kind ("volume" or "network")
        kind: &'static str,
        /// Resource name
        name: String,
    },

    /// Pulling an image failed
    #[error("failed to pull image '{image}': {source}")]
    Pull {
        image: String,
        #[source]
        source: Box<BackendError>,
    },

    /// No engine is registered under this name
    #[error("unknown backend engine '{0}'")]
    UnknownBackend(String),

    /// Auto-detection found no usable engine
    #[error("no backend engine is available on this host")]
    NoBackendAvailable,
}

impl BackendError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error comes from translating a step
    pub fn is_translation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMountSpec { .. } | Self::InvalidNamespace { .. }
        )
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Check if this error is a conflict with an existing resource
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. }) || matches!(self, Self::Api { status: 409, .. })
    }
}
