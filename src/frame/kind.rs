//! 802.11 frame type/subtype classification

/// Frame type values from bits 2-3 of the frame control field
pub const TYPE_MGMT: u8 = 0;
pub const TYPE_CTRL: u8 = 1;
pub const TYPE_DATA: u8 = 2;

/// Management subtypes the capture filters care about
pub const SUBTYPE_PROBE_REQ: u8 = 4;
pub const SUBTYPE_PROBE_RES: u8 = 5;
pub const SUBTYPE_BEACON: u8 = 8;

/// Read the little-endian frame control field from the start of a frame
pub fn frame_control(frame: &[u8]) -> Option<u16> {
    match frame {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Extract the 2-bit frame type
pub fn frame_type(fc: u16) -> u8 {
    ((fc & 0x000C) >> 2) as u8
}

/// Extract the 4-bit frame subtype
pub fn frame_subtype(fc: u16) -> u8 {
    ((fc & 0x00F0) >> 4) as u8
}

/// Frame category derived from (type, subtype)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    AssocReq,
    AssocRes,
    ReassocReq,
    ReassocRes,
    ProbeReq,
    ProbeRes,
    Beacon,
    Atim,
    Disassoc,
    Auth,
    Deauth,
    Action,
    /// Management subtype without a dedicated label
    Mgmt,
    BlockAckReq,
    BlockAck,
    PsPoll,
    Rts,
    Cts,
    Ack,
    CfEnd,
    /// Control subtype without a dedicated label
    Ctrl,
    Data,
    Unknown,
}

impl FrameKind {
    /// Classify a frame control value
    pub fn classify(fc: u16) -> Self {
        let subtype = frame_subtype(fc);

        match frame_type(fc) {
            TYPE_MGMT => match subtype {
                0 => Self::AssocReq,
                1 => Self::AssocRes,
                2 => Self::ReassocReq,
                3 => Self::ReassocRes,
                4 => Self::ProbeReq,
                5 => Self::ProbeRes,
                8 => Self::Beacon,
                9 => Self::Atim,
                10 => Self::Disassoc,
                11 => Self::Auth,
                12 => Self::Deauth,
                13 => Self::Action,
                _ => Self::Mgmt,
            },
            TYPE_CTRL => match subtype {
                8 => Self::BlockAckReq,
                9 => Self::BlockAck,
                10 => Self::PsPoll,
                11 => Self::Rts,
                12 => Self::Cts,
                13 => Self::Ack,
                14 => Self::CfEnd,
                _ => Self::Ctrl,
            },
            TYPE_DATA => Self::Data,
            _ => Self::Unknown,
        }
    }

    /// Classify raw frame bytes; frames shorter than the control field are `Unknown`
    pub fn of_frame(frame: &[u8]) -> Self {
        frame_control(frame).map(Self::classify).unwrap_or(Self::Unknown)
    }

    /// Wire label used by the packets API
    pub fn label(self) -> &'static str {
        match self {
            Self::AssocReq => "ASSOC_REQ",
            Self::AssocRes => "ASSOC_RES",
            Self::ReassocReq => "REASSOC_REQ",
            Self::ReassocRes => "REASSOC_RES",
            Self::ProbeReq => "PROBE_REQ",
            Self::ProbeRes => "PROBE_RES",
            Self::Beacon => "BEACON",
            Self::Atim => "ATIM",
            Self::Disassoc => "DISASSOC",
            Self::Auth => "AUTH",
            Self::Deauth => "DEAUTH",
            Self::Action => "ACTION",
            Self::Mgmt => "MGMT",
            Self::BlockAckReq => "BLOCK_ACK_REQ",
            Self::BlockAck => "BLOCK_ACK",
            Self::PsPoll => "PS_POLL",
            Self::Rts => "RTS",
            Self::Cts => "CTS",
            Self::Ack => "ACK",
            Self::CfEnd => "CF_END",
            Self::Ctrl => "CTRL",
            Self::Data => "DATA",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
