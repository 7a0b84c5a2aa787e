mod config;
mod error;
mod executor;
mod link;
mod queue;
mod registry;

pub use config::{ModbusConfig, SwitchConfig};
pub use error::Error;
pub use executor::ModbusExecutor;
pub use link::{merge_inputs, pulse, read_states, Coils, TcpLink, CONNECT_TIMEOUT};
pub use queue::{Command, CommandExecutor, CommandQueue, PulseOutcome, Response};
pub use registry::{Registry, Switch};

pub type Result<T> = std::result::Result<T, Error>;
