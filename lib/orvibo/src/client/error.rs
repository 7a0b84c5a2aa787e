use std::net::IpAddr;

use crate::Mac;

#[derive(Debug)]
pub enum Error {
    Disconnected,
    Io(std::io::Error),
    LocalIp(local_ip_address::Error),
    UnsupportedLocalIp(IpAddr),
    UnknownDevice(Mac),
    Uncorrelated,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<local_ip_address::Error> for Error {
    fn from(err: local_ip_address::Error) -> Self {
        Self::LocalIp(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::LocalIp(err) => write!(f, "Unable to get local ip address: {err}"),
            Self::UnsupportedLocalIp(ip) => write!(f, "Local ip address {ip} is not IPv4"),
            Self::UnknownDevice(mac) => write!(f, "Unknown device: {mac}"),
            Self::Uncorrelated => write!(f, "Request has no single device to answer it"),
        }
    }
}

impl std::error::Error for Error {}
