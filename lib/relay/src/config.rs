use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ModbusConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Time a coil is held before release, and the wait after release.
    #[serde(default = "default_delay_between_signals")]
    pub delay_between_signals_ms: u64,
    pub switch_all_off: u16,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
}

impl ModbusConfig {
    pub fn delay_between_signals(&self) -> Duration {
        Duration::from_millis(self.delay_between_signals_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub on: u16,
    pub off: u16,
    /// Bit of the merged discrete inputs reflecting this switch. Either
    /// `mask` or `index` (`mask = 1 << index`) must be set.
    #[serde(default)]
    pub mask: Option<u32>,
    #[serde(default)]
    pub index: Option<u8>,
}

fn default_port() -> u16 {
    502
}

fn default_delay_between_signals() -> u64 {
    300
}

fn default_active() -> bool {
    true
}
