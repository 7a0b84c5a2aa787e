use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetSwitchStates,
    Switch { id: String, is_enabled: bool },
    SwitchAllOff,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetSwitchStates => write!(f, "get switch states"),
            Self::Switch { id, is_enabled } => {
                write!(f, "switch {id} {}", if *is_enabled { "on" } else { "off" })
            }
            Self::SwitchAllOff => write!(f, "switch all off"),
        }
    }
}

/// States read back after a pulse, and the switches that did not end up in
/// the requested state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseOutcome {
    pub states: BTreeMap<String, bool>,
    pub mismatch: Vec<String>,
}

impl PulseOutcome {
    pub fn is_verified(&self) -> bool {
        self.mismatch.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    States(BTreeMap<String, bool>),
    Switched(PulseOutcome),
}

#[async_trait]
pub trait CommandExecutor: Send + 'static {
    async fn execute(&mut self, command: Command) -> Result<Response>;
}

struct Job {
    command: Command,
    result: oneshot::Sender<Result<Response>>,
}

/// Runs commands one at a time, oldest first, waiting a fixed delay after
/// each of them.
#[derive(Clone)]
pub struct CommandQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl CommandQueue {
    pub fn start<E: CommandExecutor>(executor: E, delay: Duration) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(executor, rx, delay));

        Self { jobs }
    }

    /// The command is queued right away, the returned future only waits for
    /// its result.
    pub fn enqueue(&self, command: Command) -> impl Future<Output = Result<Response>> {
        let (result, rx) = oneshot::channel();
        let queued = self.jobs.send(Job { command, result }).is_ok();

        async move {
            if !queued {
                return Err(Error::QueueClosed);
            }

            rx.await.map_err(|_| Error::QueueClosed)?
        }
    }

    pub async fn get_switch_states(&self) -> Result<BTreeMap<String, bool>> {
        match self.enqueue(Command::GetSwitchStates).await? {
            Response::States(states) => Ok(states),
            Response::Switched(_) => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn switch(&self, id: &str, is_enabled: bool) -> Result<PulseOutcome> {
        let command = Command::Switch {
            id: id.to_string(),
            is_enabled,
        };

        match self.enqueue(command).await? {
            Response::Switched(outcome) => Ok(outcome),
            Response::States(_) => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn switch_all_off(&self) -> Result<PulseOutcome> {
        match self.enqueue(Command::SwitchAllOff).await? {
            Response::Switched(outcome) => Ok(outcome),
            Response::States(_) => Err(Error::UnexpectedResponse),
        }
    }
}

async fn run<E: CommandExecutor>(
    mut executor: E,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    delay: Duration,
) {
    while let Some(Job { command, result }) = jobs.recv().await {
        debug!("running {command}");

        let response = executor.execute(command.clone()).await;

        if let Err(err) = &response {
            error!("unable to {command}: {err}");
        }

        sleep(delay).await;

        if result.send(response).is_err() {
            debug!("result of {command} was not awaited");
        }
    }

    debug!("command queue stopped");
}
