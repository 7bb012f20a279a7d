//! Captured frame records

use chrono::{DateTime, Utc};

use crate::radio::{RxControl, RxPacket};

use super::kind::FrameKind;

/// Maximum stored payload per frame
pub const MAX_FRAME_LEN: usize = 1024;

/// Length of the trailing frame check sequence
pub const FCS_LEN: usize = 4;

/// A frame copied out of the driver's receive buffer
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Frame bytes without FCS, truncated to `MAX_FRAME_LEN`
    pub payload: Vec<u8>,

    /// Signal strength in dBm
    pub rssi: i8,

    /// Channel the frame was observed on
    pub channel: u8,

    /// Receive-control block exactly as the driver supplied it
    pub rx_ctrl: RxControl,

    /// Host time the frame was copied
    pub captured_at: DateTime<Utc>,
}

impl FrameRecord {
    /// Copy a received packet into an owned record.
    ///
    /// The stored length is `sig_len - 4` capped at `MAX_FRAME_LEN` and at the
    /// bytes actually present. Returns `None` if the buffer cannot be allocated.
    pub fn capture(packet: &RxPacket<'_>) -> Option<Self> {
        let len = (packet.rx_ctrl.sig_len as usize)
            .saturating_sub(FCS_LEN)
            .min(MAX_FRAME_LEN)
            .min(packet.payload.len());

        let mut payload = Vec::new();
        payload.try_reserve_exact(len).ok()?;
        payload.extend_from_slice(&packet.payload[..len]);

        Some(Self {
            payload,
            rssi: packet.rx_ctrl.rssi,
            channel: packet.rx_ctrl.channel,
            rx_ctrl: packet.rx_ctrl,
            captured_at: Utc::now(),
        })
    }

    /// Stored payload length
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::of_frame(&self.payload)
    }
}
