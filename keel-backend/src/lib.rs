//! Keel Backend
//!
//! Pipeline execution backends.
//!
//! A backend engine turns the steps of a compiled pipeline into running
//! containers. The scheduler selects one engine at startup with
//! [`select_engine`], calls [`Engine::load`] once, and then drives it
//! through setup, per-step execution and teardown.
//!
//! Only the podman engine is provided.

pub mod engine;
pub mod error;
pub mod podman;

pub use engine::{Engine, LogReader};
pub use error::{BackendError, Result};
pub use podman::{PodmanEngine, PodmanOptions};

/// Backend name that picks the first available engine
pub const AUTO_DETECT: &str = "auto";

/// Returns every compiled-in engine, in detection order
pub fn engines(options: &PodmanOptions) -> Vec<Box<dyn Engine>> {
    vec![Box::new(PodmanEngine::new(options.clone()))]
}

/// Selects an engine by name
///
/// With [`AUTO_DETECT`] the first engine reporting itself available is
/// returned. The engine still has to be loaded.
pub fn select_engine(name: &str, options: &PodmanOptions) -> Result<Box<dyn Engine>> {
    let mut candidates = engines(options).into_iter();

    if name == AUTO_DETECT {
        return candidates
            .find(|engine| engine.is_available())
            .ok_or(BackendError::NoBackendAvailable);
    }

    candidates
        .find(|engine| engine.name() == name)
        .ok_or_else(|| BackendError::UnknownBackend(name.to_string()))
}
