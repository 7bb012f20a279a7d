//! Capture filter categories and channel selection

use serde::Serialize;

use crate::error::{CaptureError, Result};
use crate::frame::kind::{SUBTYPE_BEACON, SUBTYPE_PROBE_REQ, SUBTYPE_PROBE_RES, TYPE_MGMT};
use crate::frame::{frame_control, frame_subtype, frame_type};
use crate::radio::FilterMask;

/// Highest channel accepted for a fixed-channel capture
pub const MAX_CHANNEL: u8 = 13;

/// Channel list cycled by the hopper, in order
pub const HOP_CHANNELS: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

/// Which frames a capture session keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFilter {
    #[default]
    All,
    /// Management frames only
    Management,
    /// Data frames only
    Data,
    /// Control frames only
    Control,
    /// Beacons only
    Beacon,
    /// Probe requests and responses only
    Probe,
}

impl CaptureFilter {
    /// Parse a filter name. Unknown names select `All`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "management" => Self::Management,
            "data" => Self::Data,
            "control" => Self::Control,
            "beacon" => Self::Beacon,
            "probe" => Self::Probe,
            _ => Self::All,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Management => "management",
            Self::Data => "data",
            Self::Control => "control",
            Self::Beacon => "beacon",
            Self::Probe => "probe",
        }
    }

    /// Coarse driver-level mask. Beacon and probe capture ride on the
    /// management mask and are narrowed by `accepts`.
    pub fn driver_mask(self) -> FilterMask {
        match self {
            Self::All => FilterMask::ALL,
            Self::Management | Self::Beacon | Self::Probe => FilterMask::MGMT,
            Self::Data => FilterMask::DATA,
            Self::Control => FilterMask::CTRL,
        }
    }

    /// Software post-filter applied in the receive callback
    pub fn accepts(self, frame: &[u8]) -> bool {
        match self {
            Self::Beacon | Self::Probe => {
                let Some(fc) = frame_control(frame) else {
                    return false;
                };
                if frame_type(fc) != TYPE_MGMT {
                    return false;
                }
                let subtype = frame_subtype(fc);
                if self == Self::Beacon {
                    subtype == SUBTYPE_BEACON
                } else {
                    subtype == SUBTYPE_PROBE_REQ || subtype == SUBTYPE_PROBE_RES
                }
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested channel behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "channel", rename_all = "lowercase")]
pub enum ChannelSpec {
    /// Stay on one channel
    Fixed(u8),
    /// Cycle through `HOP_CHANNELS`
    Hopping,
}

impl ChannelSpec {
    /// `0` selects hopping, `1..=13` a fixed channel
    pub fn from_number(channel: i64) -> Result<Self> {
        match channel {
            0 => Ok(Self::Hopping),
            1..=13 => Ok(Self::Fixed(channel as u8)),
            _ => Err(CaptureError::InvalidChannel(channel)),
        }
    }

    /// Wire number: 0 for hopping
    pub fn number(self) -> u8 {
        match self {
            Self::Fixed(channel) => channel,
            Self::Hopping => 0,
        }
    }
}

impl std::fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(channel) => write!(f, "channel {}", channel),
            Self::Hopping => write!(f, "channels 1-{} (hopping)", MAX_CHANNEL),
        }
    }
}
