use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::camera::CameraConfig;
use crate::cli::CliArgs;
use crate::sdk::sim::SimConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Bounds of the image publish rate, in messages per second.
pub const MIN_PUBLISH_RATE: f64 = 0.01;
pub const MAX_PUBLISH_RATE: f64 = 1000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub stream: StreamConfig,
    pub network: NetworkConfig,
    pub sim: SimConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Buffers kept by the stream layer; 0 keeps the device default.
    pub buffer_count: i64,
    pub buffer_handling_mode: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: 1,
            buffer_handling_mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub address: String,
    pub port: u16,
    pub topic: String,
    /// Image messages per second.
    pub publish_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1"),
            port: 5560,
            topic: String::from("spinnaker/image"),
            publish_rate: 10.0,
        }
    }
}

impl NetworkConfig {
    /// Interval between image messages. Rates outside
    /// [`MIN_PUBLISH_RATE`, `MAX_PUBLISH_RATE`] are clamped.
    pub fn publish_period(&self) -> Duration {
        let rate = self.publish_rate.clamp(MIN_PUBLISH_RATE, MAX_PUBLISH_RATE);
        Duration::try_from_secs_f64(1.0 / rate)
            .unwrap_or_else(|_| Duration::from_secs_f64(1.0 / MIN_PUBLISH_RATE))
    }
}

impl Config {
    pub fn load(cli_args: &CliArgs) -> Result<Self> {
        let mut config = match cli_args.config.as_deref() {
            Some(path) => Self::from_file(Path::new(path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                warn!(
                    "No configuration file at {}, using defaults",
                    DEFAULT_CONFIG_PATH
                );
                Self::default()
            }
        };

        // Override config with CLI arguments
        config.override_with_cli_args(cli_args);

        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());

        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }

    fn override_with_cli_args(&mut self, args: &CliArgs) {
        if let Some(timeout) = args.grab_timeout_ms {
            self.camera.grab_timeout_ms = timeout;
        }
        self.camera.settings.extend(args.settings.iter().cloned());

        if let Some(count) = args.buffer_count {
            self.stream.buffer_count = count;
        }

        if let Some(address) = &args.address {
            self.network.address = address.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(topic) = &args.topic {
            self.network.topic = topic.clone();
        }
        if let Some(rate) = args.publish_rate {
            self.network.publish_rate = rate;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.camera
            .validate()
            .map_err(|e| anyhow!(e))
            .context("Invalid camera configuration")?;

        if self.stream.buffer_count < 0 {
            return Err(anyhow!("Stream buffer count cannot be negative"));
        }
        if let Some(mode) = &self.stream.buffer_handling_mode {
            if mode.trim().is_empty() {
                return Err(anyhow!("Buffer handling mode cannot be empty"));
            }
        }

        if self.network.address.is_empty() || self.network.topic.is_empty() {
            return Err(anyhow!("Network address and topic cannot be empty"));
        }
        if !(MIN_PUBLISH_RATE..=MAX_PUBLISH_RATE).contains(&self.network.publish_rate) {
            return Err(anyhow!(
                "Publish rate must be within [{}, {}] Hz",
                MIN_PUBLISH_RATE,
                MAX_PUBLISH_RATE
            ));
        }

        self.sim
            .validate()
            .map_err(|e| anyhow!(e))
            .context("Invalid simulated camera configuration")?;

        Ok(())
    }
}
