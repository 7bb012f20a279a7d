//! In-memory radio used for demo mode and tests
//!
//! Behaves like a driver that delivers frames from an interrupt context:
//! frames handed to `deliver` reach the registered callback only while
//! monitor mode is on and the frame type passes the coarse filter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::frame::{frame_control, frame_type};

use super::{DriverError, DriverOp, FilterMask, RadioDriver, RxCallback, RxControl, RxPacket};

/// Driver code for a rejected argument
pub const ERR_INVALID_ARG: i32 = 0x102;

/// Driver code for a radio that is busy or not ready
pub const ERR_NOT_READY: i32 = 0x3002;

/// Scripted `set_channel` failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChannelFaults {
    #[default]
    None,
    /// Every attempt fails
    Always,
    /// The next N attempts fail, then attempts succeed
    Next(u32),
    /// Attempts to tune these channels fail
    Channels(Vec<u8>),
}

impl ChannelFaults {
    /// Parse `always`, `next:N` or a comma-separated channel list.
    /// Empty or `none` means no faults.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec {
            "" | "none" => return Some(Self::None),
            "always" => return Some(Self::Always),
            _ => {}
        }
        if let Some(count) = spec.strip_prefix("next:") {
            return count.trim().parse().ok().map(Self::Next);
        }
        spec.split(',')
            .map(|ch| ch.trim().parse::<u8>().ok())
            .collect::<Option<Vec<u8>>>()
            .map(Self::Channels)
    }
}

struct SimState {
    promiscuous: bool,
    filter: FilterMask,
    callback: Option<RxCallback>,
    channel: Option<u8>,
    channel_attempts: Vec<u8>,
    channel_faults: ChannelFaults,
    promiscuous_error: Option<i32>,
    filter_error: Option<i32>,
}

/// Simulated radio driver
pub struct SimulatedRadio {
    state: Mutex<SimState>,
    epoch: Instant,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                promiscuous: false,
                filter: FilterMask::ALL,
                callback: None,
                channel: None,
                channel_attempts: Vec::new(),
                channel_faults: ChannelFaults::None,
                promiscuous_error: None,
                filter_error: None,
            }),
            epoch: Instant::now(),
        }
    }

    pub fn set_channel_faults(&self, faults: ChannelFaults) {
        self.state.lock().channel_faults = faults;
    }

    /// Deliver a frame (without FCS) as if it had just been received.
    /// Returns whether the callback was invoked.
    pub fn deliver(&self, frame: &[u8], rssi: i8) -> bool {
        let (callback, channel) = {
            let state = self.state.lock();
            if !state.promiscuous {
                return false;
            }
            let Some(callback) = state.callback.clone() else {
                return false;
            };
            if let Some(fc) = frame_control(frame) {
                if !state.filter.contains_type(frame_type(fc)) {
                    return false;
                }
            }
            (callback, state.channel.unwrap_or(0))
        };

        // Callback runs outside the driver lock, like a real rx path
        let packet = RxPacket {
            payload: frame,
            rx_ctrl: RxControl {
                rssi,
                channel,
                noise_floor: -95,
                rate: 2,
                sig_len: (frame.len() + 4).min(u16::MAX as usize) as u16,
                timestamp_us: self.epoch.elapsed().as_micros() as u64,
            },
        };
        callback(&packet);
        true
    }

    /// Generate a synthetic mix of traffic until the task is aborted
    pub fn spawn_traffic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!("Simulated traffic every {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut seq: u32 = 0;
            loop {
                ticker.tick().await;
                let frame = synthetic_frame(seq);
                let rssi = -30 - (seq.wrapping_mul(7) % 60) as i8;
                if self.deliver(&frame, rssi) {
                    debug!("Simulated frame {} ({} bytes)", seq, frame.len());
                }
                seq = seq.wrapping_add(1);
            }
        })
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripting and inspection hooks for tests
#[cfg(test)]
impl SimulatedRadio {
    /// Make enabling monitor mode fail with `code`, or succeed again with `None`
    pub fn fail_promiscuous(&self, code: Option<i32>) {
        self.state.lock().promiscuous_error = code;
    }

    /// Make filter programming fail with `code`, or succeed again with `None`
    pub fn fail_filter(&self, code: Option<i32>) {
        self.state.lock().filter_error = code;
    }

    /// Current tuned channel, if any tune succeeded
    pub fn channel(&self) -> Option<u8> {
        self.state.lock().channel
    }

    /// Every channel passed to `set_channel`, successful or not
    pub fn channel_attempts(&self) -> Vec<u8> {
        self.state.lock().channel_attempts.clone()
    }

    pub fn is_promiscuous(&self) -> bool {
        self.state.lock().promiscuous
    }

    pub fn filter(&self) -> FilterMask {
        self.state.lock().filter
    }

    pub fn has_callback(&self) -> bool {
        self.state.lock().callback.is_some()
    }
}

impl RadioDriver for SimulatedRadio {
    fn name(&self) -> &str {
        "simulated"
    }

    fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if enabled {
            if let Some(code) = state.promiscuous_error {
                return Err(DriverError::new(DriverOp::Promiscuous, code));
            }
        }
        state.promiscuous = enabled;
        Ok(())
    }

    fn set_filter(&self, mask: FilterMask) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if let Some(code) = state.filter_error {
            return Err(DriverError::new(DriverOp::Filter, code));
        }
        state.filter = mask;
        Ok(())
    }

    fn set_rx_callback(&self, callback: Option<RxCallback>) -> Result<(), DriverError> {
        self.state.lock().callback = callback;
        Ok(())
    }

    fn set_channel(&self, channel: u8) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.channel_attempts.push(channel);

        if !(1..=14).contains(&channel) {
            return Err(DriverError::new(DriverOp::Channel, ERR_INVALID_ARG));
        }

        let fail = match &mut state.channel_faults {
            ChannelFaults::None => false,
            ChannelFaults::Always => true,
            ChannelFaults::Next(remaining) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            }
            ChannelFaults::Channels(bad) => bad.contains(&channel),
        };
        if fail {
            return Err(DriverError::new(DriverOp::Channel, ERR_NOT_READY));
        }

        state.channel = Some(channel);
        Ok(())
    }
}

const BROADCAST: [u8; 6] = [0xff; 6];
const SIM_AP: [u8; 6] = [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01];
const SIM_STA: [u8; 6] = [0x02, 0x00, 0x5e, 0x20, 0x00, 0x02];

/// Build a 24-byte management/data header followed by `body`
pub fn build_frame(fc: u16, addr1: [u8; 6], addr2: [u8; 6], addr3: [u8; 6], body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(24 + body.len());
    frame.extend_from_slice(&fc.to_le_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // duration
    frame.extend_from_slice(&addr1);
    frame.extend_from_slice(&addr2);
    frame.extend_from_slice(&addr3);
    frame.extend_from_slice(&[0x00, 0x00]); // sequence control
    frame.extend_from_slice(body);
    frame
}

fn synthetic_frame(seq: u32) -> Vec<u8> {
    match seq % 6 {
        // beacon with SSID "sim-ap"
        0 => {
            let mut body = vec![0u8; 12];
            body.extend_from_slice(&[0x00, 0x06]);
            body.extend_from_slice(b"sim-ap");
            build_frame(0x0080, BROADCAST, SIM_AP, SIM_AP, &body)
        }
        1 => build_frame(0x0040, BROADCAST, SIM_STA, BROADCAST, &[0x00, 0x00]),
        2 => build_frame(0x0050, SIM_STA, SIM_AP, SIM_AP, &[0u8; 12]),
        3 => build_frame(0x0208, SIM_AP, SIM_STA, SIM_AP, &[0xaa; 96]),
        4 => {
            // ACK carries only a receiver address
            let mut ack = vec![0xd4, 0x00, 0x00, 0x00];
            ack.extend_from_slice(&SIM_STA);
            ack
        }
        _ => build_frame(0x00b0, SIM_AP, SIM_STA, SIM_AP, &[0x00, 0x00, 0x01, 0x00, 0x00, 0x00]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (RxCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback: RxCallback = Arc::new(move |_packet: &RxPacket<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    #[test]
    fn test_deliver_requires_monitor_mode() {
        let radio = SimulatedRadio::new();
        let (callback, count) = counting_callback();
        radio.set_rx_callback(Some(callback)).unwrap();

        assert!(!radio.deliver(&synthetic_frame(0), -40));
        radio.set_promiscuous(true).unwrap();
        assert!(radio.deliver(&synthetic_frame(0), -40));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_coarse_filter_applies() {
        let radio = SimulatedRadio::new();
        let (callback, count) = counting_callback();
        radio.set_rx_callback(Some(callback)).unwrap();
        radio.set_promiscuous(true).unwrap();
        radio.set_filter(FilterMask::MGMT).unwrap();

        assert!(radio.deliver(&synthetic_frame(0), -40)); // beacon
        assert!(!radio.deliver(&synthetic_frame(3), -40)); // data
        assert!(!radio.deliver(&synthetic_frame(4), -40)); // ack
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channel_faults() {
        let radio = SimulatedRadio::new();
        radio.set_channel_faults(ChannelFaults::Next(2));
        assert!(radio.set_channel(6).is_err());
        assert!(radio.set_channel(6).is_err());
        assert!(radio.set_channel(6).is_ok());
        assert_eq!(radio.channel(), Some(6));

        radio.set_channel_faults(ChannelFaults::Channels(vec![12, 13]));
        assert!(radio.set_channel(11).is_ok());
        assert!(radio.set_channel(12).is_err());
        assert_eq!(radio.channel(), Some(11));

        assert_eq!(
            radio.set_channel(0),
            Err(DriverError::new(DriverOp::Channel, ERR_INVALID_ARG))
        );
        assert_eq!(radio.channel_attempts(), vec![6, 6, 6, 11, 12, 0]);
    }

    #[test]
    fn test_parse_channel_faults() {
        assert_eq!(ChannelFaults::parse(""), Some(ChannelFaults::None));
        assert_eq!(ChannelFaults::parse("always"), Some(ChannelFaults::Always));
        assert_eq!(ChannelFaults::parse("next:3"), Some(ChannelFaults::Next(3)));
        assert_eq!(
            ChannelFaults::parse("12, 13"),
            Some(ChannelFaults::Channels(vec![12, 13]))
        );
        assert_eq!(ChannelFaults::parse("next:x"), None);
        assert_eq!(ChannelFaults::parse("1,x"), None);
    }

    #[test]
    fn test_promiscuous_failure() {
        let radio = SimulatedRadio::new();
        radio.fail_promiscuous(Some(ERR_NOT_READY));
        assert!(radio.set_promiscuous(true).is_err());
        assert!(!radio.is_promiscuous());
        // disabling never fails
        assert!(radio.set_promiscuous(false).is_ok());
    }
}
