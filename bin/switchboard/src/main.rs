use std::collections::HashMap;
use std::time::Duration;

use switchboard::{Config, Controllable, Gateway};

use log::{error, info};
use orvibo::{Mac, SocketHandle};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task;
use tokio::time::{interval, MissedTickBehavior};

type ErasedError = Box<dyn std::error::Error + Send + Sync + 'static>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), ErasedError> {
    pretty_env_logger::init_timed();

    info!("switchboard version {VERSION}");

    let config = Config::load()?;
    info!("starting {}", config.service.name);

    let gateway = Gateway::start(&config).await?;

    let sockets = gateway.discover_sockets().await?;
    info!("{} sockets ready", sockets.len());

    let mut sigterm = signal(SignalKind::terminate())?;
    let poll_interval = config.sockets.poll_interval();

    let poll_handle = task::spawn(poll_states(gateway, sockets, poll_interval));

    tokio::select! {
        _ = poll_handle => {},
        _ = sigterm.recv() => { info!("got SIGTERM, exiting...") },
    };

    Ok(())
}

async fn poll_states(gateway: Gateway, sockets: HashMap<Mac, SocketHandle>, period: Duration) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        match gateway.get_switch_states().await {
            Ok(states) => {
                for (id, switch) in states {
                    info!(
                        "switch {id} ({}) is {}",
                        switch.label,
                        if switch.state { "on" } else { "off" }
                    );
                }
            }
            Err(err) => error!("unable to read switch states: {err}"),
        }

        for socket in sockets.values() {
            let state = match socket.state().await {
                Some(true) => "on",
                Some(false) => "off",
                None => "unknown",
            };

            info!("socket {} is {state}", Controllable::name(socket).await);
        }
    }
}
