//! # DShot Frame Encoder
//!
//! Packs a throttle command into a 16-bit DShot frame.
//!
//! ```text
//! bit 15 ............ 5 | 4         | 3 .. 0
//!     throttle (11 bit) | telemetry | checksum
//! ```

use super::checksum::nibble_checksum;
use super::protocol::*;

/// A 16-bit frame as it goes out on the wire, MSB first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    inner: u16,
}

impl Frame {
    /// Build a frame from a raw throttle value
    ///
    /// The throttle is expected in 0-2047 already; bits above the 11-bit
    /// field are dropped by the shift, not re-validated.
    ///
    /// # Examples
    ///
    /// ```
    /// use dshot_engine::dshot::encoder::Frame;
    /// use dshot_engine::dshot::protocol::ChecksumMode;
    ///
    /// let frame = Frame::new(1046, false, ChecksumMode::Normal);
    /// assert_eq!(frame.throttle(), 1046);
    /// assert_eq!(frame.checksum(), 0x6);
    /// ```
    pub fn new(throttle: u16, telemetry: bool, mode: ChecksumMode) -> Self {
        Self {
            inner: encode_frame(throttle, telemetry, mode),
        }
    }

    /// Build a frame from a command
    pub fn from_command(command: &Command, mode: ChecksumMode) -> Self {
        Self::new(command.throttle, command.telemetry, mode)
    }

    /// Throttle field (0-2047)
    pub fn throttle(&self) -> u16 {
        self.inner >> DSHOT_THROTTLE_POSITION
    }

    /// Telemetry request flag
    pub fn telemetry_requested(&self) -> bool {
        (self.inner >> DSHOT_TELEMETRY_POSITION) & 0x01 != 0
    }

    /// Checksum field (4 bits)
    pub fn checksum(&self) -> u16 {
        self.inner & 0x0F
    }

    /// Whether the checksum matches the remaining 12 bits under `mode`
    pub fn is_well_formed(&self, mode: ChecksumMode) -> bool {
        self.checksum() == nibble_checksum(self.inner >> 4, mode)
    }

    /// Raw 16-bit value
    pub fn bits(&self) -> u16 {
        self.inner
    }
}

/// Encode a throttle command into a raw 16-bit frame
///
/// # Arguments
///
/// * `throttle` - DShot throttle value (0-2047, 0-47 reserved)
/// * `telemetry` - Telemetry request flag
/// * `mode` - Checksum polarity (inverted for bidirectional DShot)
///
/// # Returns
///
/// * `u16` - Frame with the checksum in bits 3..0
pub fn encode_frame(throttle: u16, telemetry: bool, mode: ChecksumMode) -> u16 {
    let mut packet = throttle << DSHOT_THROTTLE_POSITION;
    packet |= (telemetry as u16) << DSHOT_TELEMETRY_POSITION;

    packet | nibble_checksum(packet >> 4, mode)
}
