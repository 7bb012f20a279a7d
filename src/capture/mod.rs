//! Capture core: session control, channel scheduling and frame buffering

mod filter;
mod queue;
mod scheduler;
mod session;
mod stats;

pub use filter::{CaptureFilter, ChannelSpec};
pub use scheduler::SchedulerTiming;
pub use session::CaptureController;
