//! # DShot Engine Library
//!
//! Drive brushless ESCs with DShot and read back their eRPM telemetry.
//!
//! This library encodes throttle commands into interleaved timer/DMA burst
//! buffers and, in bidirectional mode, captures and decodes each motor's
//! GCR-encoded eRPM response in a round-robin between bursts.

pub mod config;
pub mod error;
pub mod dshot;
pub mod telemetry;
pub mod timer;
