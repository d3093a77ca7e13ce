//! C6 Device Decoder: a host-buildable model of the LED driver's firmware-side byte parser,
//! double-buffered channel memory, gamma correction, fault latching, and local test patterns.
//!
//! This module never touches a real serial port; [`crate::serial`] drives bytes into
//! [`parser::Decoder::feed_bytes`] when exercising a loopback or simulated device, and the host
//! otherwise only ever talks to the decoder's counterpart running on actual hardware.

pub mod channel;
pub mod fault;
pub mod gamma;
pub mod parser;
pub mod pattern;
pub mod telemetry;

pub use channel::Rgb;
pub use parser::{Decoder, DeviceConfig, Mode, NUM_CHANNELS};
pub use telemetry::Snapshot;
