use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::net::lookup_host;

use crate::config::ModbusConfig;
use crate::link::{pulse, read_states, Coils, TcpLink};
use crate::queue::{Command, CommandExecutor, PulseOutcome, Response};
use crate::registry::Registry;
use crate::{Error, Result};

/// Opens a fresh connection to the Modbus slave for every command.
pub struct ModbusExecutor {
    host: String,
    port: u16,
    delay: Duration,
    registry: Arc<Registry>,
}

impl ModbusExecutor {
    pub fn new(config: &ModbusConfig, registry: Arc<Registry>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            delay: config.delay_between_signals(),
            registry,
        }
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| Error::UnresolvedHost(self.host.clone()))
    }
}

#[async_trait]
impl CommandExecutor for ModbusExecutor {
    async fn execute(&mut self, command: Command) -> Result<Response> {
        if let Command::Switch { id, .. } = &command {
            self.registry.get(id)?;
        }

        let addr = self.resolve().await?;
        let mut link = TcpLink::connect(addr).await;

        let response = execute(&mut link, &self.registry, command, self.delay).await;

        if let Err(err) = link.disconnect().await {
            warn!("unable to disconnect from {addr}: {err}");
        }

        response
    }
}

async fn execute<C: Coils + ?Sized>(
    link: &mut C,
    registry: &Registry,
    command: Command,
    delay: Duration,
) -> Result<Response> {
    match command {
        Command::GetSwitchStates => {
            let states = registry.decode(read_states(link).await?);
            registry.update(&states).await;

            Ok(Response::States(states))
        }
        Command::Switch { id, is_enabled } => {
            let switch = registry.get(&id)?;
            let states = registry.decode(pulse(link, switch.coil(is_enabled), delay).await?);
            registry.update(&states).await;

            let mismatch = match states.get(&id) {
                Some(state) if *state == is_enabled => vec![],
                _ => {
                    warn!(
                        "switch {id} is still {} after switching",
                        if is_enabled { "off" } else { "on" }
                    );
                    vec![id]
                }
            };

            Ok(Response::Switched(PulseOutcome { states, mismatch }))
        }
        Command::SwitchAllOff => {
            let states = registry.decode(pulse(link, registry.all_off(), delay).await?);
            registry.update(&states).await;

            let mismatch: Vec<String> = states
                .iter()
                .filter(|(_, state)| **state)
                .map(|(id, _)| id.clone())
                .collect();

            if mismatch.is_empty() {
                debug!("all switches are off");
            } else {
                warn!("switches still on after switching all off: {mismatch:?}");
            }

            Ok(Response::Switched(PulseOutcome { states, mismatch }))
        }
    }
}
