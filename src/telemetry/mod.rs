//! # Telemetry Module
//!
//! Bidirectional DShot eRPM telemetry.
//!
//! This module handles:
//! - Round-robin capture of one motor's response per transmit burst
//! - Edge timestamp → GCR → nibble decoding with CRC validation
//! - Decode outcome statistics
//! - Handoff of complete period batches to the control loop
//! - Logging drained batches to rotating JSONL files

pub mod gcr;
pub mod decoder;
pub mod encoder;
pub mod stats;
pub mod mailbox;
pub mod capture;
pub mod recorder;
