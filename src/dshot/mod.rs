//! # DShot Protocol Module
//!
//! Transmit side of the DShot ESC protocol.
//!
//! This module handles:
//! - Frame construction (11-bit throttle, telemetry flag, 4-bit checksum)
//! - Normal and inverted (bidirectional) checksum polarity
//! - Expansion of frames into interleaved duty codes for a DMA burst

pub mod protocol;
pub mod encoder;
pub mod checksum;
pub mod burst;
