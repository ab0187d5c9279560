//! # eRPM Telemetry Decoder
//!
//! Turns the raw edge timestamps captured after a bidirectional DShot frame
//! into the electrical period reported by the ESC.
//!
//! ## Pipeline
//!
//! ```text
//! edge timestamps ─► run lengths ─► 21-bit line value ─► Gray→binary
//!   ─► 4 × 5-bit symbols ─► 4 nibbles ─► [exp:3 | mantissa:9 | crc:4]
//! ```
//!
//! The line idles high after the burst. Sample 0 is the tail of the outgoing
//! frame and is ignored; sample 1 is the start of the response. Every later
//! sample ends one run; runs alternate high/low starting high. A zero sample
//! marks the end of the capture.

use thiserror::Error;

use super::gcr::{nibble_from_symbol, GCR_SYMBOL_BITS};
use super::stats::{DecodeOutcome, TelemetryStats};
use crate::dshot::checksum::nibble_checksum;
use crate::dshot::protocol::*;

/// Reasons a capture does not yield a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No edges after the reference sample
    #[error("no telemetry signal captured")]
    NoSignal,

    /// A 5-bit group is not a GCR symbol
    #[error("invalid GCR symbol 0x{0:02X}")]
    BadNibble(u8),

    /// CRC does not match the payload
    #[error("CRC mismatch: expected 0x{expected:X}, got 0x{received:X}")]
    BadCrc { expected: u16, received: u16 },
}

impl DecodeError {
    /// Statistics bucket for this error
    pub fn outcome(&self) -> DecodeOutcome {
        match self {
            DecodeError::NoSignal => DecodeOutcome::NoSignal,
            DecodeError::BadNibble(_) => DecodeOutcome::BadNibble,
            DecodeError::BadCrc { .. } => DecodeOutcome::BadCrc,
        }
    }
}

/// Decoded eRPM telemetry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErpmFrame {
    /// Left shift applied to the mantissa (3 bits)
    pub exponent: u8,
    /// Period mantissa (9 bits)
    pub mantissa: u16,
    /// Received CRC (4 bits)
    pub crc: u16,
}

impl ErpmFrame {
    /// Split a 16-bit telemetry word
    pub fn from_data(data: u16) -> Self {
        Self {
            exponent: ((data & 0xE000) >> 13) as u8,
            mantissa: (data & 0x1FF0) >> 4,
            crc: data & 0x0F,
        }
    }

    /// 12-bit payload (exponent and mantissa)
    pub fn payload(&self) -> u16 {
        ((self.exponent as u16) << 9) | self.mantissa
    }

    /// Electrical period in timer ticks
    pub fn period(&self) -> u32 {
        (self.mantissa as u32) << self.exponent
    }

    /// CRC the ESC should have sent for this payload
    pub fn expected_crc(&self) -> u16 {
        nibble_checksum(self.payload(), ChecksumMode::Inverted)
    }
}

/// Rebuild the line value from edge timestamps
///
/// # Returns
///
/// * `(u32, u32)` - Accumulated bits (newest in bit 0) and how many bits were shifted in
pub fn reconstruct_line(samples: &[u16]) -> (u32, u32) {
    let mut value: u32 = 0;
    let mut shifted: u32 = 0;
    let mut high: u32 = 1;

    let mut previous = match samples.get(1) {
        Some(&sample) => sample,
        None => return (0, 0),
    };

    for &sample in samples.iter().take(CAPTURE_SAMPLES).skip(2) {
        if sample == 0 {
            break;
        }

        let interval = sample.wrapping_sub(previous) as u32;
        let bits = (interval + TELEMETRY_ROUNDING_BIAS) / TELEMETRY_TICKS_PER_BIT;

        // Anything past 32 bits has already fallen off the accumulator
        for _ in 0..bits.min(u32::BITS) {
            value = (value << 1) | high;
        }
        shifted = shifted.saturating_add(bits);

        high ^= 1;
        previous = sample;
    }

    (value, shifted)
}

/// Align a reconstructed line value to the full 21-bit frame
///
/// A trailing low run has no closing edge inside the capture window, so the
/// missing bits are restored as zeros.
pub fn align_line(value: u32, shifted: u32) -> u32 {
    if shifted < TELEMETRY_FRAME_BITS {
        value << (TELEMETRY_FRAME_BITS - shifted)
    } else {
        value
    }
}

/// Convert a line value to the 16-bit telemetry word
///
/// # Errors
///
/// Returns `DecodeError::BadNibble` if any 5-bit group is not a GCR symbol
pub fn line_to_data(line: u32) -> Result<u16, DecodeError> {
    let mut gcr = line ^ (line >> 1);
    let mut data: u16 = 0;

    for index in 0..4 {
        let symbol = (gcr & 0x1F) as u8;
        let nibble = nibble_from_symbol(symbol).ok_or(DecodeError::BadNibble(symbol))?;
        data |= (nibble as u16) << (4 * index);
        gcr >>= GCR_SYMBOL_BITS;
    }

    Ok(data)
}

/// Decode a capture buffer into an electrical period
///
/// # Arguments
///
/// * `samples` - Edge timestamps for one motor (up to 32, zero-terminated)
///
/// # Returns
///
/// * `Result<u32, DecodeError>` - Period in timer ticks
///
/// # Examples
///
/// ```
/// use dshot_engine::telemetry::decoder::{decode_samples, DecodeError};
///
/// assert_eq!(decode_samples(&[0u16; 32]), Err(DecodeError::NoSignal));
/// ```
pub fn decode_samples(samples: &[u16]) -> Result<u32, DecodeError> {
    let (value, shifted) = reconstruct_line(samples);

    if shifted == 0 {
        return Err(DecodeError::NoSignal);
    }

    let data = line_to_data(align_line(value, shifted))?;
    let frame = ErpmFrame::from_data(data);

    let expected = frame.expected_crc();
    if frame.crc != expected {
        return Err(DecodeError::BadCrc {
            expected,
            received: frame.crc,
        });
    }

    Ok(frame.period())
}

/// Decode a capture buffer and count the outcome
///
/// Exactly one counter in `stats` is incremented per call.
///
/// # Returns
///
/// * `u32` - Period in timer ticks, 0 on any failure
pub fn decode_period(samples: &[u16], stats: &TelemetryStats) -> u32 {
    match decode_samples(samples) {
        Ok(period) => {
            stats.record(DecodeOutcome::Ok);
            period
        }
        Err(err) => {
            stats.record(err.outcome());
            0
        }
    }
}

/// Electrical RPM for a period in microseconds, 0 when stopped
pub fn period_to_erpm(period_us: u32) -> u32 {
    if period_us == 0 {
        return 0;
    }
    60_000_000 / period_us
}

/// Mechanical RPM from electrical RPM
pub fn erpm_to_rpm(erpm: u32, pole_count: u32) -> u32 {
    if pole_count < 2 {
        return 0;
    }
    erpm * 2 / pole_count
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Capture of a stopped motor: line value 0x1AD6AE, last low run unterminated
    fn stopped_motor_samples() -> [u16; CAPTURE_SAMPLES] {
        let edges = [
            7, 100, 140, 160, 180, 200, 240, 260, 280, 300, 340, 360, 380, 400, 420, 440, 500,
        ];
        let mut samples = [0u16; CAPTURE_SAMPLES];
        samples[..edges.len()].copy_from_slice(&edges);
        samples
    }

    #[test]
    fn test_reconstruct_stopped_motor_line() {
        let (value, shifted) = reconstruct_line(&stopped_motor_samples());
        assert_eq!(shifted, 20);
        assert_eq!(align_line(value, shifted), 0x1AD6AE);
    }

    #[test]
    fn test_stopped_motor_data_word() {
        assert_eq!(line_to_data(0x1AD6AE), Ok(0xFFF0));
    }

    #[test]
    fn test_decode_stopped_motor() {
        let stats = TelemetryStats::new();
        let period = decode_period(&stopped_motor_samples(), &stats);

        // mantissa 511, exponent 7
        assert_eq!(period, 65408);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ok, 1);
        assert_eq!(snapshot.total(), 1);
    }

    #[test]
    fn test_first_sample_ignored() {
        let mut samples = stopped_motor_samples();
        samples[0] = 12345;
        assert_eq!(decode_samples(&samples), Ok(65408));
    }

    #[test]
    fn test_rounding_tolerates_jitter() {
        let mut samples = stopped_motor_samples();
        // +-2 ticks per edge keeps every interval within rounding
        for (index, sample) in samples.iter_mut().enumerate().skip(2).take(15) {
            if index % 2 == 0 {
                *sample += 2;
            } else {
                *sample -= 2;
            }
        }
        assert_eq!(decode_samples(&samples), Ok(65408));
    }

    #[test]
    fn test_all_zero_samples_no_signal() {
        let stats = TelemetryStats::new();
        assert_eq!(decode_period(&[0u16; CAPTURE_SAMPLES], &stats), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.no_signal, 1);
        assert_eq!(snapshot.ok + snapshot.bad_nibble + snapshot.bad_crc, 0);
    }

    #[test]
    fn test_reference_only_is_no_signal() {
        let mut samples = [0u16; CAPTURE_SAMPLES];
        samples[0] = 10;
        samples[1] = 100;
        assert_eq!(decode_samples(&samples), Err(DecodeError::NoSignal));
    }

    #[test]
    fn test_short_buffer_is_no_signal() {
        assert_eq!(decode_samples(&[]), Err(DecodeError::NoSignal));
        assert_eq!(decode_samples(&[5]), Err(DecodeError::NoSignal));
    }

    #[test]
    fn test_bad_symbol_reported() {
        // Lowest group 00000 after Gray conversion
        let err = line_to_data(0).unwrap_err();
        assert_eq!(err, DecodeError::BadNibble(0x00));
        assert_eq!(err.outcome(), DecodeOutcome::BadNibble);
    }

    #[test]
    fn test_bad_crc_reported() {
        // 0xFFF0 with CRC bit 0 flipped; symbol for 0x1 is 0x1B
        let gcr: u32 = 0x1B | (0x0F << 5) | (0x0F << 10) | (0x0F << 15);
        let mut line = 1u32 << 20;
        for bit in (0..20).rev() {
            let upper = (line >> (bit + 1)) & 1;
            line |= (upper ^ ((gcr >> bit) & 1)) << bit;
        }
        assert_eq!(line_to_data(line), Ok(0xFFF1));

        let frame = ErpmFrame::from_data(0xFFF1);
        assert_eq!(frame.expected_crc(), 0x0);
        assert_ne!(frame.crc, frame.expected_crc());
    }

    #[test]
    fn test_erpm_frame_fields() {
        let frame = ErpmFrame::from_data(0xFFF0);
        assert_eq!(frame.exponent, 7);
        assert_eq!(frame.mantissa, 0x1FF);
        assert_eq!(frame.crc, 0);
        assert_eq!(frame.payload(), 0xFFF);
        assert_eq!(frame.period(), 511 << 7);
    }

    #[test]
    fn test_long_run_does_not_overflow() {
        let mut samples = [0u16; CAPTURE_SAMPLES];
        samples[1] = 100;
        samples[2] = 100 + 40 * 20;
        // 40 high bits: far beyond a valid frame, still terminates
        let (value, shifted) = reconstruct_line(&samples);
        assert_eq!(shifted, 40);
        assert_eq!(value, u32::MAX);
        assert!(decode_samples(&samples).is_err());
    }

    #[test]
    fn test_period_to_erpm() {
        assert_eq!(period_to_erpm(0), 0);
        assert_eq!(period_to_erpm(1000), 60_000);
        assert_eq!(period_to_erpm(65408), 917);
    }

    #[test]
    fn test_erpm_to_rpm() {
        assert_eq!(erpm_to_rpm(14_000, 14), 2_000);
        assert_eq!(erpm_to_rpm(10_000, 0), 0);
        assert_eq!(erpm_to_rpm(10_000, 1), 0);
    }
}
