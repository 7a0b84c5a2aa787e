use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use tokio::sync::Mutex;

use crate::config::{ModbusConfig, SwitchConfig};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub id: String,
    pub label: String,
    pub on: u16,
    pub off: u16,
    pub mask: u32,
}

impl Switch {
    fn from_config(config: &SwitchConfig) -> Result<Self> {
        let mask = match (config.mask, config.index) {
            (Some(0), _) => return Err(Error::InvalidSwitch(config.id.clone(), "empty mask")),
            (Some(mask), _) => mask,
            (None, Some(index)) if index < 32 => 1 << index,
            (None, Some(_)) => {
                return Err(Error::InvalidSwitch(config.id.clone(), "index out of range"))
            }
            (None, None) => {
                return Err(Error::InvalidSwitch(config.id.clone(), "missing mask"))
            }
        };

        Ok(Self {
            id: config.id.clone(),
            label: config.label.clone().unwrap_or_else(|| config.id.clone()),
            on: config.on,
            off: config.off,
            mask,
        })
    }

    /// Coil to pulse to bring the switch to `is_enabled`.
    pub fn coil(&self, is_enabled: bool) -> u16 {
        if is_enabled {
            self.on
        } else {
            self.off
        }
    }

    pub fn is_enabled(&self, inputs: u32) -> bool {
        inputs & self.mask != 0
    }
}

/// Active switches by id, plus the last state read for each of them.
#[derive(Debug)]
pub struct Registry {
    switches: BTreeMap<String, Switch>,
    all_off: u16,
    states: Mutex<HashMap<String, bool>>,
}

impl Registry {
    pub fn new(config: &ModbusConfig) -> Result<Self> {
        let mut switches = BTreeMap::new();

        for switch in config.switches.iter().filter(|s| s.active) {
            let switch = Switch::from_config(switch)?;

            if switches.contains_key(&switch.id) {
                return Err(Error::InvalidSwitch(switch.id, "duplicate id"));
            }

            switches.insert(switch.id.clone(), switch);
        }

        info!("registered {} switches", switches.len());

        Ok(Self {
            switches,
            all_off: config.switch_all_off,
            states: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, id: &str) -> Result<&Switch> {
        self.switches
            .get(id)
            .ok_or_else(|| Error::UnknownSwitch(id.to_string()))
    }

    pub fn switches(&self) -> impl Iterator<Item = &Switch> {
        self.switches.values()
    }

    pub fn all_off(&self) -> u16 {
        self.all_off
    }

    /// Decodes every switch from the merged discrete inputs.
    pub fn decode(&self, inputs: u32) -> BTreeMap<String, bool> {
        self.switches
            .values()
            .map(|switch| (switch.id.clone(), switch.is_enabled(inputs)))
            .collect()
    }

    pub async fn update(&self, states: &BTreeMap<String, bool>) {
        let mut cached = self.states.lock().await;

        for (id, state) in states {
            if cached.insert(id.clone(), *state) != Some(*state) {
                debug!("switch {id} is {}", if *state { "on" } else { "off" });
            }
        }
    }

    /// Last known state, `None` until the switch was read at least once.
    pub async fn state(&self, id: &str) -> Option<bool> {
        let cached = self.states.lock().await;
        cached.get(id).copied()
    }
}
