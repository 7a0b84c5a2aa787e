use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::time::{sleep, timeout};
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;

use crate::Result;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Discrete inputs are read in two blocks, `(address, count)`.
const FIRST_INPUTS: (u16, u16) = (1, 9);
const SECOND_INPUTS: (u16, u16) = (9, 19);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Coils: Send {
    async fn read_discrete_inputs(&mut self, address: u16, count: u16) -> Result<Vec<bool>>;
    async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;
}

pub struct TcpLink {
    ctx: Context,
}

impl TcpLink {
    /// Never gives up: every attempt is bounded by [`CONNECT_TIMEOUT`] and
    /// failures are retried.
    pub async fn connect(addr: SocketAddr) -> Self {
        let ctx = connect_with_retry(|| tcp::connect(addr)).await;
        debug!("connected to {addr}");

        Self { ctx }
    }
}

#[async_trait]
impl Coils for TcpLink {
    async fn read_discrete_inputs(&mut self, address: u16, count: u16) -> Result<Vec<bool>> {
        Ok(self.ctx.read_discrete_inputs(address, count).await??)
    }

    async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<()> {
        Ok(self.ctx.write_single_coil(address, value).await??)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.ctx.disconnect().await?;
        Ok(())
    }
}

async fn connect_with_retry<F, Fut, T>(mut connect: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match timeout(CONNECT_TIMEOUT, connect()).await {
            Ok(Ok(link)) => return link,
            Ok(Err(err)) => {
                warn!("unable to connect: {err}, retrying");
                sleep(RETRY_DELAY).await;
            }
            Err(_) => warn!("connect timed out, retrying"),
        }
    }
}

fn pack(bits: &[bool]) -> [u8; 2] {
    let mut bytes = [0; 2];

    for (i, _) in bits.iter().take(16).enumerate().filter(|(_, bit)| **bit) {
        bytes[i / 8] |= 1 << (i % 8);
    }

    bytes
}

/// Combines both input blocks into one integer: the first byte of the first
/// block, followed by the first twelve bits of the second one.
pub fn merge_inputs(first: &[bool], second: &[bool]) -> u32 {
    let first = u16::from_be_bytes(pack(first)) as u32;
    let second = u16::from_be_bytes(pack(second)) as u32;

    let low = first >> 8;
    let high = (second >> 8) | ((second & 0x0f) << 8);

    low | high << 8
}

pub async fn read_states<C: Coils + ?Sized>(link: &mut C) -> Result<u32> {
    let first = link
        .read_discrete_inputs(FIRST_INPUTS.0, FIRST_INPUTS.1)
        .await?;
    let second = link
        .read_discrete_inputs(SECOND_INPUTS.0, SECOND_INPUTS.1)
        .await?;

    let inputs = merge_inputs(&first, &second);
    debug!("discrete inputs {inputs:#07x}");

    Ok(inputs)
}

/// Presses and releases `coil`, then reads the inputs back.
pub async fn pulse<C: Coils + ?Sized>(link: &mut C, coil: u16, delay: Duration) -> Result<u32> {
    debug!("pulsing coil {coil}");

    link.write_single_coil(coil, true).await?;
    sleep(delay).await;
    link.write_single_coil(coil, false).await?;
    sleep(delay).await;

    read_states(link).await
}
