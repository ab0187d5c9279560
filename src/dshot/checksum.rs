//! # DShot Nibble Checksum
//!
//! XOR fold of the three nibbles of a 12-bit value, used by both directions:
//! the throttle frame checksum and the eRPM telemetry CRC.
//!
//! **Normal**: `(v ^ (v >> 4) ^ (v >> 8)) & 0x0F`
//! **Inverted**: complement of the above, masked to 4 bits

use super::protocol::ChecksumMode;

/// Number of nibbles folded into the checksum
const CHECKSUM_NIBBLES: u32 = 3;

/// Fold the three nibbles of a 12-bit value
///
/// # Arguments
///
/// * `value` - Frame or telemetry payload without its checksum (12 bits)
/// * `mode` - Checksum polarity
///
/// # Returns
///
/// * `u16` - 4-bit checksum
///
/// # Examples
///
/// ```
/// use dshot_engine::dshot::checksum::nibble_checksum;
/// use dshot_engine::dshot::protocol::ChecksumMode;
///
/// assert_eq!(nibble_checksum(0x82C, ChecksumMode::Normal), 0x6);
/// assert_eq!(nibble_checksum(0x82C, ChecksumMode::Inverted), 0x9);
/// ```
pub fn nibble_checksum(value: u16, mode: ChecksumMode) -> u16 {
    let folded = value ^ (value >> 4) ^ (value >> 8);

    match mode {
        ChecksumMode::Normal => folded & 0x0F,
        ChecksumMode::Inverted => !folded & 0x0F,
    }
}

/// Fold nibble by nibble (slow, for verification)
#[allow(dead_code)]
fn nibble_checksum_slow(value: u16, mode: ChecksumMode) -> u16 {
    let mut data = value;
    let mut checksum = 0u16;

    for _ in 0..CHECKSUM_NIBBLES {
        checksum ^= data & 0x0F;
        data >>= 4;
    }

    match mode {
        ChecksumMode::Normal => checksum,
        ChecksumMode::Inverted => !checksum & 0x0F,
    }
}
