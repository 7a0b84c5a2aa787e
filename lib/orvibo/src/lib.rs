mod client;
mod decoder;
mod devices;
mod frame;
mod mac;
mod transport;

pub use client::{Client, Error, SocketHandle, DISCOVERY_WINDOW, SETTLE_DELAY};
pub use devices::{fallback_name, Phase, Socket};
pub use frame::{Reply, Request, Response};
pub use mac::{InvalidMac, Mac};
pub use transport::{Event, Transport, PORT};

pub type Result<T> = std::result::Result<T, Error>;
