use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use orvibo::{fallback_name, Client, Mac, SocketHandle};
use relay::{CommandQueue, ModbusExecutor, PulseOutcome, Registry};
use serde::Serialize;
use tokio::time::timeout;

pub mod config;
mod error;

pub use config::Config;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that can be switched on and off.
#[async_trait]
pub trait Controllable: Send + Sync {
    async fn name(&self) -> String;
    /// `None` while the state was never read.
    async fn state(&self) -> Option<bool>;
    async fn set_state(&self, is_enabled: bool) -> Result<()>;
}

#[async_trait]
impl Controllable for SocketHandle {
    async fn name(&self) -> String {
        SocketHandle::name(self)
            .await
            .unwrap_or_else(|| fallback_name(self.mac()))
    }

    async fn state(&self) -> Option<bool> {
        SocketHandle::state(self).await
    }

    async fn set_state(&self, is_enabled: bool) -> Result<()> {
        Ok(SocketHandle::set_state(self, is_enabled).await?)
    }
}

/// A relay switch behind the Modbus command queue.
#[derive(Clone)]
pub struct RelaySwitch {
    id: String,
    label: String,
    queue: CommandQueue,
    registry: Arc<Registry>,
}

impl RelaySwitch {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Controllable for RelaySwitch {
    async fn name(&self) -> String {
        self.label.clone()
    }

    async fn state(&self) -> Option<bool> {
        self.registry.state(&self.id).await
    }

    /// Resolves even when the switch did not follow, the mismatch is logged.
    async fn set_state(&self, is_enabled: bool) -> Result<()> {
        self.queue.switch(&self.id, is_enabled).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchState {
    pub label: String,
    pub state: bool,
}

pub struct Gateway {
    sockets: Option<Client>,
    queue: CommandQueue,
    registry: Arc<Registry>,
    request_timeout: Duration,
}

impl Gateway {
    /// Binds the Orvibo transport (unless disabled) and starts the Modbus
    /// command queue.
    pub async fn start(config: &Config) -> Result<Self> {
        let sockets = if config.sockets.enabled {
            Some(Client::activate().await?)
        } else {
            info!("orvibo sockets are disabled");
            None
        };

        let registry = Arc::new(Registry::new(&config.modbus)?);
        let executor = ModbusExecutor::new(&config.modbus, registry.clone());
        let queue = CommandQueue::start(executor, config.modbus_queue.delay());

        Ok(Self::new(
            sockets,
            queue,
            registry,
            config.sockets.request_timeout(),
        ))
    }

    pub fn new(
        sockets: Option<Client>,
        queue: CommandQueue,
        registry: Arc<Registry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sockets,
            queue,
            registry,
            request_timeout,
        }
    }

    /// Discovers sockets, then subscribes to and names all of them
    /// concurrently. A socket failing to prepare is still returned.
    pub async fn discover_sockets(&self) -> Result<HashMap<Mac, SocketHandle>> {
        self.discover_sockets_at(Ipv4Addr::BROADCAST).await
    }

    pub async fn discover_sockets_at(&self, ip: Ipv4Addr) -> Result<HashMap<Mac, SocketHandle>> {
        let Some(client) = &self.sockets else {
            return Ok(HashMap::new());
        };

        let found = client.discover_at(ip).await?;

        let prepared = join_all(found.keys().map(|mac| self.prepare(client, *mac))).await;

        for (mac, result) in found.keys().zip(prepared) {
            if let Err(err) = result {
                warn!("unable to prepare socket {mac}: {err}");
            }
        }

        Ok(found
            .into_keys()
            .map(|mac| (mac, client.handle(mac)))
            .collect())
    }

    async fn prepare(&self, client: &Client, mac: Mac) -> Result<()> {
        timeout(self.request_timeout, async {
            client.subscribe(mac).await?;
            client.query_name(mac).await
        })
        .await??;

        debug!("socket {mac} is ready");
        Ok(())
    }

    pub async fn get_switch_states(&self) -> Result<BTreeMap<String, SwitchState>> {
        let states = self.queue.get_switch_states().await?;

        let states = states
            .into_iter()
            .filter_map(|(id, state)| {
                let switch = match self.registry.get(&id) {
                    Ok(switch) => switch,
                    Err(err) => {
                        error!("{err}");
                        return None;
                    }
                };

                let label = switch.label.clone();
                Some((id, SwitchState { label, state }))
            })
            .collect();

        Ok(states)
    }

    pub async fn switch(&self, id: &str, is_enabled: bool) -> Result<PulseOutcome> {
        info!(
            "wants to switch {} {id}",
            if is_enabled { "on" } else { "off" }
        );

        Ok(self.queue.switch(id, is_enabled).await?)
    }

    pub async fn switch_all_off(&self) -> Result<PulseOutcome> {
        info!("wants to switch all off");
        Ok(self.queue.switch_all_off().await?)
    }

    pub fn relay_switch(&self, id: &str) -> Result<RelaySwitch> {
        let switch = self.registry.get(id)?;

        Ok(RelaySwitch {
            id: switch.id.clone(),
            label: switch.label.clone(),
            queue: self.queue.clone(),
            registry: self.registry.clone(),
        })
    }

    pub fn relay_switches(&self) -> Vec<RelaySwitch> {
        self.registry
            .switches()
            .map(|switch| RelaySwitch {
                id: switch.id.clone(),
                label: switch.label.clone(),
                queue: self.queue.clone(),
                registry: self.registry.clone(),
            })
            .collect()
    }
}
