//! Keel Core
//!
//! Core types for the Keel pipeline backend.
//!
//! This crate contains the plain data model handed from the pipeline
//! scheduler to a backend engine: what to run (steps grouped in stages),
//! which shared resources to create (volumes, networks) and what a finished
//! step reports back (state). It has no behavior beyond validation.

pub mod domain;

pub use domain::config::{Config, ConfigError, Network, Stage, Volume};
pub use domain::state::State;
pub use domain::step::{AuthConfig, PullPolicy, Step};
