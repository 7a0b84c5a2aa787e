use std::path::Path;
use std::time::Duration;

use log::info;
use relay::ModbusConfig;
use serde::Deserialize;

use crate::{Error, Result};

const DEFAULT_PATH: &str = "config.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub sockets: SocketsConfig,
    pub modbus: ModbusConfig,
    #[serde(default)]
    pub modbus_queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "switchboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketsConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    /// Bounds subscribing and naming a single socket.
    pub request_timeout_secs: u64,
}

impl Default for SocketsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 30,
            request_timeout_secs: 5,
        }
    }
}

impl SocketsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { delay_ms: 100 }
    }
}

impl QueueConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Config {
    /// Reads the file named by `SWITCHBOARD_CONFIG`, then applies
    /// `MODBUS_HOST` and `MODBUS_PORT` on top of it.
    pub fn load() -> Result<Self> {
        let path = std::env::var("SWITCHBOARD_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::read(&path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;

        Ok(config)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("reading config from {}", path.display());

        let contents = std::fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn apply_overrides(&mut self, var: impl Fn(&'static str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("MODBUS_HOST") {
            self.modbus.host = host;
        }

        if let Some(port) = var("MODBUS_PORT") {
            self.modbus.port = port
                .parse()
                .map_err(|_| Error::InvalidEnv("MODBUS_PORT", port))?;
        }

        Ok(())
    }
}
