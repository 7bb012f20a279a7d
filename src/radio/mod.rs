//! Radio driver boundary
//!
//! The capture core only talks to hardware through `RadioDriver`:
//! 1. Enter/leave monitor (promiscuous) mode
//! 2. Program the coarse receive filter
//! 3. Switch channel
//! 4. Register the per-frame receive callback
//!
//! Drivers are synchronous. `DriverHandle` is the async front the capture
//! core uses; it moves calls to drivers that block onto tokio's blocking pool.

mod monitor;
mod radiotap;
pub mod sim;

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

pub use monitor::MonitorInterface;
pub use sim::{ChannelFaults, SimulatedRadio};

/// Driver operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOp {
    Promiscuous,
    Filter,
    Callback,
    Channel,
}

impl std::fmt::Display for DriverOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Promiscuous => "set promiscuous mode",
            Self::Filter => "set receive filter",
            Self::Callback => "set rx callback",
            Self::Channel => "set channel",
        };
        f.write_str(name)
    }
}

/// Code reported when a driver call panicked on the blocking pool
pub const ERR_CALL_FAILED: i32 = -2;

/// Error reported by the radio driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("driver failed to {op} (code {code})")]
pub struct DriverError {
    pub op: DriverOp,
    pub code: i32,
}

impl DriverError {
    pub fn new(op: DriverOp, code: i32) -> Self {
        Self { op, code }
    }
}

/// Coarse receive filter understood by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterMask(u32);

impl FilterMask {
    pub const ALL: Self = Self(0xFFFF_FFFF);
    pub const MGMT: Self = Self(1 << 0);
    pub const CTRL: Self = Self(1 << 1);
    pub const DATA: Self = Self(1 << 2);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether frames of the given 2-bit type pass this mask
    pub fn contains_type(self, frame_type: u8) -> bool {
        let bit = match frame_type {
            0 => Self::MGMT,
            1 => Self::CTRL,
            2 => Self::DATA,
            _ => return self == Self::ALL,
        };
        self.0 & bit.0 != 0
    }
}

/// Receive-control block supplied with every frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxControl {
    /// Signal strength in dBm
    pub rssi: i8,
    /// Channel the radio was on
    pub channel: u8,
    /// Noise floor in dBm (0 if unknown)
    pub noise_floor: i8,
    /// PHY rate in 500 kbps units (0 if unknown)
    pub rate: u8,
    /// Frame length on air, including the 4-byte FCS
    pub sig_len: u16,
    /// Receive timestamp in microseconds
    pub timestamp_us: u64,
}

/// Borrowed view of one received frame, valid only for the callback's duration
#[derive(Debug, Clone, Copy)]
pub struct RxPacket<'a> {
    pub payload: &'a [u8],
    pub rx_ctrl: RxControl,
}

/// Per-frame receive callback. Runs on the driver's delivery context and
/// must not block.
pub type RxCallback = Arc<dyn Fn(&RxPacket<'_>) + Send + Sync>;

/// Hardware operations the capture core depends on
pub trait RadioDriver: Send + Sync {
    /// Short backend name for logs and status
    fn name(&self) -> &str;

    /// Enable or disable monitor mode
    fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError>;

    /// Program the coarse receive filter
    fn set_filter(&self, mask: FilterMask) -> Result<(), DriverError>;

    /// Install (or with `None`, remove) the receive callback
    fn set_rx_callback(&self, callback: Option<RxCallback>) -> Result<(), DriverError>;

    /// Tune to a channel
    fn set_channel(&self, channel: u8) -> Result<(), DriverError>;

    /// Whether calls may block the calling thread (spawn processes, wait on
    /// children). Such drivers are only called from the blocking pool.
    fn is_blocking(&self) -> bool {
        false
    }
}

/// Async handle to a shared `RadioDriver`
#[derive(Clone)]
pub struct DriverHandle {
    driver: Arc<dyn RadioDriver>,
}

impl DriverHandle {
    pub fn new(driver: Arc<dyn RadioDriver>) -> Self {
        Self { driver }
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub async fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError> {
        self.call(DriverOp::Promiscuous, move |d| d.set_promiscuous(enabled))
            .await
    }

    pub async fn set_filter(&self, mask: FilterMask) -> Result<(), DriverError> {
        self.call(DriverOp::Filter, move |d| d.set_filter(mask)).await
    }

    pub async fn set_rx_callback(&self, callback: Option<RxCallback>) -> Result<(), DriverError> {
        self.call(DriverOp::Callback, move |d| d.set_rx_callback(callback))
            .await
    }

    pub async fn set_channel(&self, channel: u8) -> Result<(), DriverError> {
        self.call(DriverOp::Channel, move |d| d.set_channel(channel))
            .await
    }

    /// Run `f` inline for non-blocking drivers, otherwise on the blocking
    /// pool. Either way the call has finished when this returns.
    async fn call<F>(&self, op: DriverOp, f: F) -> Result<(), DriverError>
    where
        F: FnOnce(&dyn RadioDriver) -> Result<(), DriverError> + Send + 'static,
    {
        if !self.driver.is_blocking() {
            return f(self.driver.as_ref());
        }

        let driver = self.driver.clone();
        match tokio::task::spawn_blocking(move || f(driver.as_ref())).await {
            Ok(result) => result,
            Err(e) => {
                error!("Driver call to {} failed: {}", op, e);
                Err(DriverError::new(op, ERR_CALL_FAILED))
            }
        }
    }
}

/// Convert a 2.4/5 GHz centre frequency to its channel number
pub fn freq_to_channel(freq_mhz: u16) -> u8 {
    match freq_mhz {
        2484 => 14,
        2412..=2472 => ((freq_mhz - 2407) / 5) as u8,
        5000..=5895 => ((freq_mhz - 5000) / 5) as u8,
        _ => 0,
    }
}
