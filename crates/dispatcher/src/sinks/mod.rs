//! Sink implementations
//!
//! Contains LogSink, HazardSink, and ChannelSink.

mod channel;
mod hazard;
mod log;

pub use self::channel::ChannelSink;
pub use self::hazard::HazardSink;
pub use self::log::LogSink;
