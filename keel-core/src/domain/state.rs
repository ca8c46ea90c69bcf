//! Step result types

use serde::{Deserialize, Serialize};

/// Terminal state of a step container, returned once by a backend's wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub exited: bool,
    pub exit_code: i32,
    pub oom_killed: bool,
}

impl State {
    /// Creates the state of a container that has exited
    pub fn exited(exit_code: i32, oom_killed: bool) -> Self {
        Self {
            exited: true,
            exit_code,
            oom_killed,
        }
    }

    /// A step succeeded when it exited with code 0 and was not OOM-killed
    pub fn is_success(&self) -> bool {
        self.exited && self.exit_code == 0 && !self.oom_killed
    }
}
