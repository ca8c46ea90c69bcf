//! Pipeline run configuration

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::step::Step;

/// Resource manifest for one pipeline run
///
/// Handed to a backend twice: once before execution (setup) and once
/// after every step has finished or the run was aborted (destroy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stages: Vec<Stage>,
    pub volumes: Vec<Volume>,
    pub networks: Vec<Network>,
}

/// Ordered group of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    pub name: String,
    pub steps: Vec<Step>,
}

/// Named volume shared by the steps of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub name: String,
    pub driver: String,
    pub driver_opts: HashMap<String, String>,
}

/// Network shared by the steps of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub name: String,
    pub driver: String,
    pub driver_opts: HashMap<String, String>,
}

/// Errors found while validating a config
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("step name '{0}' is used more than once")]
    DuplicateStepName(String),

    #[error("step in stage '{0}' has an empty name")]
    EmptyStepName(String),

    #[error("step '{0}' has no image")]
    EmptyImage(String),
}

impl Config {
    /// Iterates over every step, in stage order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.stages.iter().flat_map(|stage| stage.steps.iter())
    }

    /// Validates the config
    ///
    /// Step names address containers in every runtime call, so two steps
    /// sharing a name would silently operate on the same container.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for stage in &self.stages {
            for step in &stage.steps {
                if step.name.is_empty() {
                    return Err(ConfigError::EmptyStepName(stage.name.clone()));
                }
                if step.image.is_empty() {
                    return Err(ConfigError::EmptyImage(step.name.clone()));
                }
                if !seen.insert(step.name.as_str()) {
                    return Err(ConfigError::DuplicateStepName(step.name.clone()));
                }
            }
        }

        Ok(())
    }
}

impl Stage {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}
