//! JSON rendering of drained frames

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::frame::FrameRecord;

/// Payload bytes rendered in `data`
pub const HEX_PREVIEW_LEN: usize = 64;

/// One entry of the `/api/sniff/packets` response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketReport {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    pub channel: u8,
    pub rssi: i8,
    pub length: usize,
    /// Driver receive timestamp
    pub timestamp_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl PacketReport {
    pub fn from_record(record: &FrameRecord) -> Self {
        Self {
            kind: record.kind().label(),
            // addr1 is the receiver, addr2 the transmitter
            dst: format_mac(&record.payload, 4),
            src: format_mac(&record.payload, 10),
            channel: record.channel,
            rssi: record.rssi,
            length: record.len(),
            timestamp_us: record.rx_ctrl.timestamp_us,
            data: (!record.is_empty()).then(|| hex_preview(&record.payload)),
            captured_at: record.captured_at,
        }
    }
}

/// `aa:bb:cc:dd:ee:ff` for the 6 bytes at `offset`, if the frame is long enough
fn format_mac(frame: &[u8], offset: usize) -> Option<String> {
    let addr = frame.get(offset..offset + 6)?;
    let parts: Vec<String> = addr.iter().map(|b| format!("{:02x}", b)).collect();
    Some(parts.join(":"))
}

/// `"%02x "` groups for the first 64 bytes, with `...` when truncated
fn hex_preview(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(HEX_PREVIEW_LEN)];
    let encoded = hex::encode(shown);

    let mut out = String::with_capacity(shown.len() * 3 + 3);
    for pair in encoded.as_bytes().chunks(2) {
        out.extend(pair.iter().map(|&c| c as char));
        out.push(' ');
    }
    if payload.len() > HEX_PREVIEW_LEN {
        out.push_str("...");
    }
    out
}
