use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, oneshot};
use tokio_util::udp::UdpFramed;

use crate::decoder::OrviboCoder;
use crate::frame::{Reply, Request, Response};
use crate::{Error, Mac, Result};

pub const PORT: u16 = 10000;

const EVENTS_CAPACITY: usize = 64;

type SocketWriter = UdpFramed<OrviboCoder>;
type SocketReader = UdpFramed<OrviboCoder>;

type Key = (Mac, Reply);

#[derive(Debug, Clone)]
pub enum Event {
    /// Every datagram that did not come from this host.
    Packet { source: SocketAddr, bytes: Vec<u8> },
    Response(Response),
}

#[derive(Clone)]
pub struct Transport {
    local_addr: SocketAddr,
    device_port: u16,
    write: Arc<tokio::sync::Mutex<SocketWriter>>,
    pending: Arc<Mutex<Pending>>,
    events: broadcast::Sender<Event>,
}

impl Transport {
    /// Binds to the first non-loopback IPv4 address on [`PORT`]. Every call
    /// binds another listener, so call it once per process.
    pub async fn activate() -> Result<Self> {
        let local_ip = match local_ip_address::local_ip()? {
            IpAddr::V4(ip) => ip,
            ip => return Err(Error::UnsupportedLocalIp(ip)),
        };

        Self::bind(local_ip, SocketAddrV4::new(local_ip, PORT), PORT).await
    }

    /// Datagrams coming from `local_ip` are treated as our own broadcasts and
    /// dropped.
    pub async fn bind(local_ip: Ipv4Addr, listen: SocketAddrV4, device_port: u16) -> Result<Self> {
        let sender = broadcast_socket()?;
        let receiver = listen_socket(listen)?;
        let local_addr = receiver.local_addr()?;

        let write = UdpFramed::new(sender, OrviboCoder);
        let read = UdpFramed::new(receiver, OrviboCoder);

        let pending = Arc::new(Mutex::new(Pending::default()));
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);

        tokio::spawn(listen_packets(
            read,
            local_ip,
            pending.clone(),
            events.clone(),
        ));

        debug!("listening on {local_addr}, ignoring packets from {local_ip}");

        Ok(Self {
            local_addr,
            device_port,
            write: Arc::new(tokio::sync::Mutex::new(write)),
            pending,
            events,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Resolves once the datagram is handed to the OS. There is no delivery
    /// acknowledgement.
    pub async fn send(&self, request: Request, ip: Ipv4Addr) -> Result<()> {
        let addr = SocketAddr::V4(SocketAddrV4::new(ip, self.device_port));
        trace!("send {request:?} to {addr}");

        let mut write = self.write.lock().await;
        write.send((request, addr)).await?;

        Ok(())
    }

    /// Sends `request` and waits for the response of the matching kind from
    /// the same MAC. Waits without limit; dropping the future withdraws it.
    pub async fn request(&self, request: Request, ip: Ipv4Addr) -> Result<Response> {
        let mac = request.mac().ok_or(Error::Uncorrelated)?;
        let mut waiter = Waiter::register(&self.pending, (mac, request.reply()));

        self.send(request, ip).await?;

        let response = (&mut waiter.rx).await.map_err(|_| Error::Disconnected)?;
        Ok(response)
    }
}

fn broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&SockAddr::from(address))?;

    UdpSocket::from_std(socket.into())
}

fn listen_socket(address: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(address))?;

    UdpSocket::from_std(socket.into())
}

async fn listen_packets(
    mut read: SocketReader,
    local_ip: Ipv4Addr,
    pending: Arc<Mutex<Pending>>,
    events: broadcast::Sender<Event>,
) {
    while let Some(item) = read.next().await {
        let (bytes, source) = match item {
            Ok(item) => item,
            Err(err) => {
                debug!("receive error {err}");
                continue;
            }
        };

        let source_ip = match source {
            SocketAddr::V4(source) => *source.ip(),
            SocketAddr::V6(_) => {
                trace!("ignored IPv6 packet from {source}");
                continue;
            }
        };

        if source_ip == local_ip {
            trace!("ignored own packet");
            continue;
        }

        trace!("packet from {source}: {}", HexBytes(&bytes));

        let response = Response::decode(&bytes, source_ip);
        _ = events.send(Event::Packet { source, bytes });

        let key = match response.reply() {
            Some(key) => key,
            None => {
                trace!("ignored unrecognized packet from {source}");
                continue;
            }
        };

        debug!("got {response:?} from {source}");

        lock(&pending).complete(key, &response);
        _ = events.send(Event::Response(response));
    }

    debug!("stopped listening");
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Outstanding requests by device and expected response kind. Each request
/// gets its own token so that it can be withdrawn without disturbing others
/// waiting on the same key.
#[derive(Default)]
struct Pending {
    next_token: u64,
    waiters: HashMap<Key, VecDeque<(u64, oneshot::Sender<Response>)>>,
}

impl Pending {
    fn register(&mut self, key: Key) -> (u64, oneshot::Receiver<Response>) {
        let token = self.next_token;
        self.next_token += 1;

        let (tx, rx) = oneshot::channel();
        self.waiters.entry(key).or_default().push_back((token, tx));

        (token, rx)
    }

    /// Hands the response to the oldest live waiter on `key`.
    fn complete(&mut self, key: Key, response: &Response) -> bool {
        let queue = match self.waiters.get_mut(&key) {
            Some(queue) => queue,
            None => return false,
        };

        let mut delivered = false;
        while let Some((_, tx)) = queue.pop_front() {
            if tx.send(response.clone()).is_ok() {
                delivered = true;
                break;
            }
        }

        if queue.is_empty() {
            self.waiters.remove(&key);
        }

        delivered
    }

    fn cancel(&mut self, key: Key, token: u64) {
        if let Some(queue) = self.waiters.get_mut(&key) {
            queue.retain(|(t, _)| *t != token);

            if queue.is_empty() {
                self.waiters.remove(&key);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiters.values().map(VecDeque::len).sum()
    }
}

struct Waiter {
    key: Key,
    token: u64,
    pending: Arc<Mutex<Pending>>,
    rx: oneshot::Receiver<Response>,
}

impl Waiter {
    fn register(pending: &Arc<Mutex<Pending>>, key: Key) -> Self {
        let (token, rx) = lock(pending).register(key);

        Self {
            key,
            token,
            pending: pending.clone(),
            rx,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        lock(&self.pending).cancel(self.key, self.token);
    }
}

struct HexBytes<'b>(&'b [u8]);

impl std::fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
