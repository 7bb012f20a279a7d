//! Radiotap header parsing
//!
//! On a monitor interface every captured record is a radiotap header wrapping
//! one 802.11 frame (link type 127). Only the fixed fields the capture core
//! needs are decoded.

use thiserror::Error;

use super::{freq_to_channel, RxControl};

/// Radiotap flags bit: frame includes FCS
const FLAG_FCS: u8 = 0x10;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadiotapError {
    #[error("truncated radiotap header")]
    Truncated,
}

/// Fields pulled from a radiotap header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Radiotap {
    /// Total header length; the 802.11 frame starts here
    pub header_len: usize,
    pub tsft: Option<u64>,
    pub flags: u8,
    pub rate: u8,
    pub freq_mhz: Option<u16>,
    pub signal_dbm: Option<i8>,
    pub noise_dbm: Option<i8>,
}

impl Radiotap {
    pub fn has_fcs(&self) -> bool {
        self.flags & FLAG_FCS != 0
    }
}

/// Parse the fields of interest (present bits 0-6) from a radiotap header
pub fn parse_radiotap(data: &[u8]) -> Result<Radiotap, RadiotapError> {
    if data.len() < 8 {
        return Err(RadiotapError::Truncated);
    }
    let header_len = u16::from_le_bytes([data[2], data[3]]) as usize;
    if header_len < 8 || header_len > data.len() {
        return Err(RadiotapError::Truncated);
    }
    let header = &data[..header_len];

    let present = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    // Skip extended present bitmaps
    let mut offset = 8;
    let mut word = present;
    while word & (1 << 31) != 0 {
        if offset + 4 > header_len {
            return Err(RadiotapError::Truncated);
        }
        word = u32::from_le_bytes([
            header[offset],
            header[offset + 1],
            header[offset + 2],
            header[offset + 3],
        ]);
        offset += 4;
    }

    let mut rt = Radiotap {
        header_len,
        ..Radiotap::default()
    };

    // (bit, alignment, size)
    const FIELDS: [(u32, usize, usize); 7] = [
        (0, 8, 8), // TSFT
        (1, 1, 1), // flags
        (2, 1, 1), // rate
        (3, 2, 4), // channel: freq + flags
        (4, 1, 2), // FHSS
        (5, 1, 1), // antenna signal
        (6, 1, 1), // antenna noise
    ];

    for (bit, align, size) in FIELDS {
        if present & (1 << bit) == 0 {
            continue;
        }
        offset = (offset + align - 1) & !(align - 1);
        if offset + size > header_len {
            return Err(RadiotapError::Truncated);
        }
        let field = &header[offset..offset + size];
        match bit {
            0 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(field);
                rt.tsft = Some(u64::from_le_bytes(raw));
            }
            1 => rt.flags = field[0],
            2 => rt.rate = field[0],
            3 => rt.freq_mhz = Some(u16::from_le_bytes([field[0], field[1]])),
            5 => rt.signal_dbm = Some(field[0] as i8),
            6 => rt.noise_dbm = Some(field[0] as i8),
            _ => {}
        }
        offset += size;
    }

    Ok(rt)
}

/// Split a radiotap record into its receive-control block and 802.11 frame.
///
/// The returned frame has any FCS removed; `sig_len` always counts four FCS
/// bytes so downstream stripping yields the full frame.
pub fn split_record(timestamp_us: u64, data: &[u8]) -> Result<(RxControl, &[u8]), RadiotapError> {
    let rt = parse_radiotap(data)?;
    let mut frame = &data[rt.header_len..];
    if rt.has_fcs() && frame.len() >= 4 {
        frame = &frame[..frame.len() - 4];
    }

    let rx_ctrl = RxControl {
        rssi: rt.signal_dbm.unwrap_or(0),
        channel: rt.freq_mhz.map(freq_to_channel).unwrap_or(0),
        noise_floor: rt.noise_dbm.unwrap_or(0),
        rate: rt.rate,
        sig_len: (frame.len() + 4).min(u16::MAX as usize) as u16,
        timestamp_us: rt.tsft.unwrap_or(timestamp_us),
    };
    Ok((rx_ctrl, frame))
}
