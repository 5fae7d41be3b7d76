use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BluetoothError, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BluelinkConfig {
    pub bluetoothctl: BluetoothctlConfig,
    pub timeouts: TimeoutConfig,
    pub discoverable: DiscoverableConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothctlConfig {
    pub program: PathBuf,
}

/// Per-workflow deadlines, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub pair_secs: u64,
    pub connect_secs: u64,
    pub disconnect_secs: u64,
    pub remove_secs: u64,
    pub trust_secs: u64,
    pub discoverable_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverableConfig {
    /// Value written with `discoverable-timeout` before turning discovery on.
    pub timeout_secs: u32,
}

impl Default for BluetoothctlConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bluetoothctl"),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            pair_secs: 20,
            connect_secs: 10,
            disconnect_secs: 10,
            remove_secs: 10,
            trust_secs: 10,
            discoverable_secs: 10,
        }
    }
}

impl Default for DiscoverableConfig {
    fn default() -> Self {
        Self { timeout_secs: 180 }
    }
}

impl TimeoutConfig {
    pub fn pair(&self) -> Duration {
        Duration::from_secs(self.pair_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn disconnect(&self) -> Duration {
        Duration::from_secs(self.disconnect_secs)
    }

    pub fn remove(&self) -> Duration {
        Duration::from_secs(self.remove_secs)
    }

    pub fn trust(&self) -> Duration {
        Duration::from_secs(self.trust_secs)
    }

    pub fn discoverable(&self) -> Duration {
        Duration::from_secs(self.discoverable_secs)
    }
}

impl BluelinkConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BluetoothError::Config(e.to_string()))
    }

    /// Reads the config at `path`, writing the defaults there when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| BluetoothError::Config(e.to_string()))?;
                if let Err(e) = fs::write(path, rendered) {
                    tracing::warn!("Could not write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
            Err(e) => Err(BluetoothError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
