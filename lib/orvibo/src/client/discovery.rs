use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{timeout_at, Instant};

use super::Client;
use crate::devices::Socket;
use crate::frame::{Request, Response};
use crate::transport::Event;
use crate::{Mac, Result};

pub const DISCOVERY_WINDOW: Duration = Duration::from_secs(2);

impl Client {
    /// Broadcasts a discovery request and returns every socket that answered
    /// within [`DISCOVERY_WINDOW`]. Late answers are missed.
    pub async fn discover(&self) -> Result<HashMap<Mac, Socket>> {
        self.discover_at(Ipv4Addr::BROADCAST).await
    }

    pub async fn discover_at(&self, ip: Ipv4Addr) -> Result<HashMap<Mac, Socket>> {
        let events = self.transport.subscribe();
        self.transport.send(Request::Discover, ip).await?;

        info!("discovering sockets at {ip}");

        let found = collect_discovered(events, DISCOVERY_WINDOW).await;

        info!("found {} sockets", found.len());

        let mut manager = self.manager.lock().await;
        let sockets = found
            .values()
            .map(|socket| (socket.mac, manager.discovered(socket)))
            .collect();

        Ok(sockets)
    }
}

pub(crate) async fn collect_discovered(
    mut events: broadcast::Receiver<Event>,
    window: Duration,
) -> HashMap<Mac, Socket> {
    let deadline = Instant::now() + window;
    let mut found: HashMap<Mac, Socket> = HashMap::new();

    loop {
        match timeout_at(deadline, events.recv()).await {
            Ok(Ok(Event::Response(Response::Discovered { mac, ip, state }))) => {
                debug!("discovered {mac} at {ip}");

                found
                    .entry(mac)
                    .and_modify(|socket| {
                        socket.ip = ip;
                        socket.state = state;
                    })
                    .or_insert_with(|| Socket::discovered(mac, ip, state));
            }
            Ok(Ok(_)) => (),
            Ok(Err(RecvError::Lagged(count))) => warn!("missed {count} packets while discovering"),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => break,
        }
    }

    found
}
