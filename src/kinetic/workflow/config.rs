// SPDX-License-Identifier: MIT

//! Runner configuration

use serde::{Deserialize, Serialize};

pub const MAX_SUPERSTEPS_ENV: &str = "KINETIC_MAX_SUPERSTEPS";
pub const CHECKPOINT_DIR_ENV: &str = "KINETIC_CHECKPOINT_DIR";

/// Limits and persistence behaviour of a workflow run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Supersteps a run may execute before failing
    pub max_supersteps: u32,
    /// Save a checkpoint after every superstep when storage is attached
    pub checkpoint_every_superstep: bool,
    /// Capacity of the streaming event channel
    pub event_buffer: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_supersteps: 100,
            checkpoint_every_superstep: true,
            event_buffer: 256,
        }
    }
}

impl RunnerConfig {
    /// Applies `KINETIC_MAX_SUPERSTEPS` when it holds a positive integer
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(MAX_SUPERSTEPS_ENV) {
            match raw.parse::<u32>() {
                Ok(limit) if limit > 0 => self.max_supersteps = limit,
                _ => log::warn!(
                    "Ignoring {}={:?}: expected a positive integer",
                    MAX_SUPERSTEPS_ENV,
                    raw
                ),
            }
        }
        self
    }

    pub fn with_max_supersteps(mut self, limit: u32) -> Self {
        self.max_supersteps = limit;
        self
    }
}

/// Default directory for file checkpoints
pub fn checkpoint_dir() -> String {
    std::env::var(CHECKPOINT_DIR_ENV).unwrap_or_else(|_| ".kinetic/checkpoints".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_supersteps, 100);
        assert!(config.checkpoint_every_superstep);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: RunnerConfig = serde_yaml::from_str("max_supersteps: 7").unwrap();
        assert_eq!(config.max_supersteps, 7);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_invalid_env_override_is_ignored() {
        std::env::set_var(MAX_SUPERSTEPS_ENV, "zero");
        let config = RunnerConfig::default().with_max_supersteps(9).with_env_overrides();
        std::env::remove_var(MAX_SUPERSTEPS_ENV);

        assert_eq!(config.max_supersteps, 9);
    }
}
