mod discovery;
mod error;

pub use discovery::DISCOVERY_WINDOW;
pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

use crate::devices::{Socket, SocketsManager};
use crate::frame::{Request, Response};
use crate::transport::{Event, Transport};
use crate::{Mac, Result};

/// Time a socket gets to settle after a command before its state is trusted.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Talks to Orvibo sockets on the local network.
///
/// Requests to different sockets may run concurrently. Requests to the same
/// socket are matched to responses in the order they were sent, so callers
/// should still avoid overlapping commands to one socket.
#[derive(Clone)]
pub struct Client {
    transport: Transport,
    manager: Arc<Mutex<SocketsManager>>,
}

impl Client {
    pub async fn activate() -> Result<Self> {
        let transport = Transport::activate().await?;
        Ok(Self::new(transport))
    }

    /// Must be called from within a tokio runtime.
    pub fn new(transport: Transport) -> Self {
        let manager = Arc::new(Mutex::new(SocketsManager::default()));
        tokio::spawn(watch_state_changes(transport.subscribe(), manager.clone()));

        Self { transport, manager }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn sockets(&self) -> HashMap<Mac, Socket> {
        let manager = self.manager.lock().await;
        manager.sockets.clone()
    }

    pub async fn socket(&self, mac: Mac) -> Result<Socket> {
        let manager = self.manager.lock().await;
        manager
            .sockets
            .get(&mac)
            .cloned()
            .ok_or(Error::UnknownDevice(mac))
    }

    pub fn handle(&self, mac: Mac) -> SocketHandle {
        SocketHandle {
            mac,
            client: self.clone(),
        }
    }

    pub async fn subscribe(&self, mac: Mac) -> Result<()> {
        let socket = self.socket(mac).await?;

        debug!("subscribing to {mac}");
        self.send(Request::Subscribe(mac), &socket).await?;
        info!("subscribed to {mac}");

        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    pub async fn query_name(&self, mac: Mac) -> Result<()> {
        let socket = self.socket(mac).await?;

        if !socket.subscribed {
            self.subscribe(mac).await?;
        }

        debug!("querying name of {mac}");
        let socket = self.send(Request::QueryName(mac), &socket).await?;
        info!("socket {mac} is named {:?}", socket.name.unwrap_or_default());

        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    /// Resolves once the socket reports its state. The reported state may
    /// differ from the requested one; read it back with [`Client::socket`].
    pub async fn set_state(&self, mac: Mac, is_enabled: bool) -> Result<()> {
        let socket = self.socket(mac).await?;

        if !socket.subscribed {
            self.subscribe(mac).await?;
        }

        if socket.name.is_none() {
            self.query_name(mac).await?;
        }

        info!(
            "switching {mac} {}",
            if is_enabled { "on" } else { "off" }
        );

        let socket = self.send(Request::SetState(mac, is_enabled), &socket).await?;

        if socket.state != is_enabled {
            warn!(
                "socket {mac} reported state {} after switching {}",
                socket.state,
                if is_enabled { "on" } else { "off" }
            );
        }

        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn send(&self, request: Request, socket: &Socket) -> Result<Socket> {
        let response = self.transport.request(request, socket.ip).await?;

        let mut manager = self.manager.lock().await;
        manager
            .apply(&response)
            .cloned()
            .ok_or(Error::UnknownDevice(socket.mac))
    }
}

/// Keeps cached state in sync with changes nobody asked for, e.g. the
/// button on the socket.
async fn watch_state_changes(
    mut events: broadcast::Receiver<Event>,
    manager: Arc<Mutex<SocketsManager>>,
) {
    loop {
        match events.recv().await {
            Ok(Event::Response(response @ Response::StateChanged { .. })) => {
                let mut manager = manager.lock().await;
                if let Some(socket) = manager.apply(&response) {
                    debug!("socket {} is {}", socket.mac, socket.state);
                }
            }
            Ok(_) => (),
            Err(RecvError::Lagged(count)) => warn!("missed {count} packets"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// A single discovered socket.
#[derive(Clone)]
pub struct SocketHandle {
    mac: Mac,
    client: Client,
}

impl SocketHandle {
    pub fn mac(&self) -> Mac {
        self.mac
    }

    pub async fn name(&self) -> Option<String> {
        self.client.socket(self.mac).await.ok()?.name
    }

    pub async fn state(&self) -> Option<bool> {
        self.client.socket(self.mac).await.ok().map(|s| s.state)
    }

    pub async fn set_state(&self, is_enabled: bool) -> Result<()> {
        self.client.set_state(self.mac, is_enabled).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Phase;
    use crate::frame::tests::{
        discovered_frame, named_frame, state_changed_frame, subscribed_frame,
    };
    use hex_literal::hex;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const MAC: Mac = Mac(hex!("accf230a1bff"));
    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Answers requests the way a socket does. A stuck socket acknowledges
    /// commands without changing state.
    struct FakeSocket {
        socket: Arc<UdpSocket>,
        macs: Vec<Mac>,
        name: [u8; 16],
        state: bool,
        stuck: bool,
    }

    impl FakeSocket {
        async fn bind(macs: Vec<Mac>) -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

            Self {
                socket: Arc::new(socket),
                macs,
                name: *b"Desk lamp       ",
                state: false,
                stuck: false,
            }
        }

        fn port(&self) -> u16 {
            self.socket.local_addr().unwrap().port()
        }

        fn spawn(mut self, gateway: SocketAddr) -> mpsc::UnboundedReceiver<Request> {
            let (tx, rx) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                let mut buffer = [0; 256];

                loop {
                    let (size, _) = self.socket.recv_from(&mut buffer).await.unwrap();
                    let request = match Request::decode(&buffer[..size]) {
                        Some(request) => request,
                        None => continue,
                    };

                    let frames = match request {
                        Request::Discover => self
                            .macs
                            .iter()
                            .map(|mac| discovered_frame(*mac, self.state))
                            .collect(),
                        Request::Subscribe(mac) => vec![subscribed_frame(mac, self.state)],
                        Request::QueryName(mac) => vec![named_frame(mac, &self.name)],
                        Request::SetState(mac, state) => {
                            if !self.stuck {
                                self.state = state;
                            }
                            vec![state_changed_frame(mac, self.state)]
                        }
                    };

                    for frame in frames {
                        self.socket.send_to(&frame, gateway).await.unwrap();
                    }

                    _ = tx.send(request);
                }
            });

            rx
        }
    }

    async fn client(device_port: u16) -> Client {
        let listen = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
        let transport = Transport::bind(Ipv4Addr::UNSPECIFIED, listen, device_port)
            .await
            .unwrap();

        Client::new(transport)
    }

    async fn start(device: FakeSocket) -> (Client, mpsc::UnboundedReceiver<Request>) {
        let client = client(device.port()).await;
        let requests = device.spawn(client.transport().local_addr());
        (client, requests)
    }

    #[tokio::test]
    async fn test_discover() {
        let other = Mac(hex!("accf00000001"));
        let device = FakeSocket::bind(vec![MAC, other]).await;
        let (client, _requests) = start(device).await;

        let found = timeout(TIMEOUT, client.discover_at(Ipv4Addr::LOCALHOST))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[&MAC].ip, Ipv4Addr::LOCALHOST);
        assert_eq!(found[&MAC].phase(), Phase::Discovered);
        assert!(found.contains_key(&other));
        assert_eq!(client.sockets().await.len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_and_query_name() {
        let mut device = FakeSocket::bind(vec![MAC]).await;
        device.state = true;
        let (client, mut requests) = start(device).await;

        client.discover_at(Ipv4Addr::LOCALHOST).await.unwrap();
        assert_eq!(requests.recv().await, Some(Request::Discover));

        timeout(TIMEOUT, client.query_name(MAC))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(requests.recv().await, Some(Request::Subscribe(MAC)));
        assert_eq!(requests.recv().await, Some(Request::QueryName(MAC)));

        let socket = client.socket(MAC).await.unwrap();
        assert_eq!(socket.phase(), Phase::Named);
        assert_eq!(socket.name.as_deref(), Some("Desk lamp"));
        assert!(socket.state);
    }

    #[tokio::test]
    async fn test_unnamed_socket_gets_placeholder() {
        let mut device = FakeSocket::bind(vec![MAC]).await;
        device.name = [0xff; 16];
        let (client, _requests) = start(device).await;

        client.discover_at(Ipv4Addr::LOCALHOST).await.unwrap();
        timeout(TIMEOUT, client.query_name(MAC))
            .await
            .unwrap()
            .unwrap();

        let handle = client.handle(MAC);
        assert_eq!(
            handle.name().await.as_deref(),
            Some("Orvibo Socket accf230a1bff")
        );
    }

    #[tokio::test]
    async fn test_set_state_prepares_socket() {
        let device = FakeSocket::bind(vec![MAC]).await;
        let (client, mut requests) = start(device).await;

        client.discover_at(Ipv4Addr::LOCALHOST).await.unwrap();
        assert_eq!(requests.recv().await, Some(Request::Discover));

        let handle = client.handle(MAC);
        assert_eq!(handle.state().await, Some(false));

        timeout(TIMEOUT, handle.set_state(true))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(requests.recv().await, Some(Request::Subscribe(MAC)));
        assert_eq!(requests.recv().await, Some(Request::QueryName(MAC)));
        assert_eq!(requests.recv().await, Some(Request::SetState(MAC, true)));

        assert_eq!(handle.state().await, Some(true));
        assert_eq!(client.socket(MAC).await.unwrap().phase(), Phase::Named);

        timeout(TIMEOUT, handle.set_state(false))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(requests.recv().await, Some(Request::SetState(MAC, false)));
        assert_eq!(handle.state().await, Some(false));
    }

    #[tokio::test]
    async fn test_set_state_resolves_when_socket_disagrees() {
        let mut device = FakeSocket::bind(vec![MAC]).await;
        device.stuck = true;
        let (client, _requests) = start(device).await;

        client.discover_at(Ipv4Addr::LOCALHOST).await.unwrap();

        timeout(TIMEOUT, client.set_state(MAC, true))
            .await
            .unwrap()
            .unwrap();

        assert!(!client.socket(MAC).await.unwrap().state);
    }

    #[tokio::test]
    async fn test_unsolicited_state_change() {
        let device = FakeSocket::bind(vec![MAC]).await;
        let button = device.socket.clone();
        let (client, _requests) = start(device).await;

        client.discover_at(Ipv4Addr::LOCALHOST).await.unwrap();
        assert!(!client.socket(MAC).await.unwrap().state);

        let frame = state_changed_frame(MAC, true);
        button
            .send_to(&frame, client.transport().local_addr())
            .await
            .unwrap();

        timeout(TIMEOUT, async {
            while !client.socket(MAC).await.unwrap().state {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let device = FakeSocket::bind(vec![MAC]).await;
        let (client, _requests) = start(device).await;

        let result = client.set_state(MAC, true).await;
        assert!(matches!(result, Err(Error::UnknownDevice(mac)) if mac == MAC));

        let handle = client.handle(MAC);
        assert_eq!(handle.name().await, None);
        assert_eq!(handle.state().await, None);
    }
}
