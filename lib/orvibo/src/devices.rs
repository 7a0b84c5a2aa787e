use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::{debug, info};

use crate::frame::Response;
use crate::Mac;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovered,
    Subscribed,
    Named,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    pub mac: Mac,
    pub ip: Ipv4Addr,
    pub name: Option<String>,
    pub state: bool,
    pub subscribed: bool,
}

impl Socket {
    pub fn discovered(mac: Mac, ip: Ipv4Addr, state: bool) -> Self {
        Self {
            mac,
            ip,
            name: None,
            state,
            subscribed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.subscribed, &self.name) {
            (false, _) => Phase::Discovered,
            (true, None) => Phase::Subscribed,
            (true, Some(_)) => Phase::Named,
        }
    }
}

/// Name shown for a socket that was never given one in the vendor app.
pub fn fallback_name(mac: Mac) -> String {
    format!("Orvibo Socket {mac}")
}

#[derive(Debug, Default)]
pub struct SocketsManager {
    pub sockets: HashMap<Mac, Socket>,
}

impl SocketsManager {
    /// The first sighting of a MAC creates the socket; later sightings only
    /// refresh its address and state.
    pub fn discovered(&mut self, found: &Socket) -> Socket {
        let socket = self
            .sockets
            .entry(found.mac)
            .and_modify(|socket| {
                socket.ip = found.ip;
                socket.state = found.state;
            })
            .or_insert_with(|| {
                info!("found socket {} at {}", found.mac, found.ip);
                found.clone()
            });

        socket.clone()
    }

    /// Records what a response says about an already known socket.
    pub fn apply(&mut self, response: &Response) -> Option<&Socket> {
        let (mac, _) = response.reply()?;
        let socket = self.sockets.get_mut(&mac)?;

        match response {
            Response::Discovered { ip, state, .. } => {
                socket.ip = *ip;
                socket.state = *state;
            }
            Response::Subscribed { state, .. } => {
                socket.subscribed = true;
                socket.state = *state;
            }
            Response::Named { name, .. } => {
                let name = name.clone().unwrap_or_else(|| fallback_name(mac));
                socket.name = Some(name);
            }
            Response::StateChanged { state, .. } => {
                socket.state = *state;
            }
            Response::Unrecognized => (),
        }

        debug!("socket {mac} is now {socket:?}");

        Some(socket)
    }
}
