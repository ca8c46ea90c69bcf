//! Core domain types
//!
//! These types are produced by the upstream scheduler and consumed by
//! backend engines. Engines never persist or mutate them.

pub mod config;
pub mod state;
pub mod step;
