//! Service layer
//!
//! Business logic of the runner: loading a compiled pipeline and driving
//! an engine through it.

mod loader;
mod pipeline;

pub use loader::load_pipeline;
pub use pipeline::{PipelineService, RunResult};
