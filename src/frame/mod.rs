//! 802.11 frame classification and captured records

pub mod kind;
mod record;

pub use kind::{frame_control, frame_subtype, frame_type};
pub use record::FrameRecord;
