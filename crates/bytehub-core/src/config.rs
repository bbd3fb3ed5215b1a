use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HubError, Result};

/// Fewest subsystem slots a hub is created with.
pub const MIN_SUBSYSTEMS: usize = 2;

/// Static hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    /// Registry capacity. Default: 16, floor 2.
    pub max_subsystems: usize,
    /// Probe buffer size per session in bytes. Default: 32, floor 16.
    pub probe_buffer_capacity: usize,
    /// Quiet period ending a timed discard, in milliseconds. Default: 250.
    pub quiet_period_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_subsystems: 16,
            probe_buffer_capacity: bytehub_probe::DEFAULT_CAPACITY,
            quiet_period_ms: 250,
        }
    }
}

impl HubConfig {
    /// Raise every value below its floor to the floor.
    pub fn normalized(mut self) -> Self {
        if self.max_subsystems < MIN_SUBSYSTEMS {
            warn!(
                requested = self.max_subsystems,
                min = MIN_SUBSYSTEMS,
                "max_subsystems below floor"
            );
            self.max_subsystems = MIN_SUBSYSTEMS;
        }
        if self.probe_buffer_capacity < bytehub_probe::MIN_CAPACITY {
            warn!(
                requested = self.probe_buffer_capacity,
                min = bytehub_probe::MIN_CAPACITY,
                "probe_buffer_capacity below floor"
            );
            self.probe_buffer_capacity = bytehub_probe::MIN_CAPACITY;
        }
        self
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Parse a JSON document; omitted fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| HubError::Config(err.to_string()))?;
        Ok(config.normalized())
    }

    /// Load a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| HubError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }
}
