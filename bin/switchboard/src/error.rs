use std::fmt;

#[derive(Debug)]
pub enum Error {
    Orvibo(orvibo::Error),
    Relay(relay::Error),
    Json(serde_json::Error),
    Timeout(tokio::time::error::Elapsed),
    Io(std::io::Error),
    InvalidEnv(&'static str, String),
}

impl From<orvibo::Error> for Error {
    fn from(err: orvibo::Error) -> Self {
        Self::Orvibo(err)
    }
}

impl From<relay::Error> for Error {
    fn from(err: relay::Error) -> Self {
        Self::Relay(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orvibo(err) => write!(f, "orvibo error: {err}"),
            Self::Relay(err) => write!(f, "relay error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Timeout(err) => write!(f, "timeout error: {err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::InvalidEnv(name, value) => write!(f, "invalid ENV variable {name}={value}"),
        }
    }
}

impl std::error::Error for Error {}
