//! # eRPM Telemetry Encoder
//!
//! ESC side of bidirectional DShot: builds the edge timestamps a capture
//! channel would record for a given period. Used by the loopback peripheral
//! and to exercise the decoder with known-good responses.

use super::decoder::ErpmFrame;
use super::gcr::{symbol_from_nibble, GCR_SYMBOL_BITS};
use crate::dshot::protocol::*;

/// Largest mantissa that fits in 9 bits
const MANTISSA_MAX: u32 = 0x1FF;

/// Largest exponent that fits in 3 bits
const EXPONENT_MAX: u8 = 7;

impl ErpmFrame {
    /// Encode a period as exponent and mantissa
    ///
    /// Uses the smallest exponent that fits, dropping low bits the way an
    /// ESC does. The CRC is filled in.
    ///
    /// Returns `None` if the period exceeds `511 << 7`.
    pub fn from_period(period: u32) -> Option<Self> {
        let mut exponent = 0u8;
        while (period >> exponent) > MANTISSA_MAX {
            if exponent == EXPONENT_MAX {
                return None;
            }
            exponent += 1;
        }

        let mut frame = Self {
            exponent,
            mantissa: (period >> exponent) as u16,
            crc: 0,
        };
        frame.crc = frame.expected_crc();
        Some(frame)
    }

    /// 16-bit telemetry word: payload followed by CRC
    pub fn data(&self) -> u16 {
        (self.payload() << 4) | (self.crc & 0x0F)
    }
}

/// Map a telemetry word to its 20-bit GCR form, lowest nibble in the lowest group
pub fn data_to_gcr(data: u16) -> u32 {
    (0..4).fold(0u32, |gcr, index| {
        let nibble = ((data >> (4 * index)) & 0x0F) as u8;
        gcr | (symbol_from_nibble(nibble) as u32) << (GCR_SYMBOL_BITS * index)
    })
}

/// Gray-encode a 20-bit GCR value onto the 21-bit line
///
/// The line starts high; every `1` in the GCR value toggles the level.
pub fn gcr_to_line(gcr: u32) -> u32 {
    let mut line = 1u32 << (TELEMETRY_FRAME_BITS - 1);

    for bit in (0..TELEMETRY_FRAME_BITS - 1).rev() {
        let upper = (line >> (bit + 1)) & 1;
        line |= (upper ^ ((gcr >> bit) & 1)) << bit;
    }

    line
}

/// Edge timestamps for a 21-bit line value
///
/// Sample 0 is the tail of the outgoing frame, sample 1 the start of the
/// response at `start`. A trailing low run gets no closing edge, like on the
/// wire where the line simply returns to idle. Unused samples stay zero.
pub fn line_to_edges(line: u32, start: u16) -> [u16; CAPTURE_SAMPLES] {
    let mut samples = [0u16; CAPTURE_SAMPLES];
    samples[0] = start / 2;
    samples[1] = start;

    let mut next = 2;
    let mut time = start;
    let mut level = 1u32;

    for bit in (0..TELEMETRY_FRAME_BITS).rev() {
        if (line >> bit) & 1 != level {
            samples[next] = time;
            next += 1;
            level ^= 1;
        }
        time = time.wrapping_add(TELEMETRY_TICKS_PER_BIT as u16);
    }

    if level == 1 {
        samples[next] = time;
    }

    samples
}

/// Capture buffer an ESC reporting `period` would produce
///
/// `start` should be nonzero and leave room for the 420-tick response
/// without wrapping through zero.
///
/// # Examples
///
/// ```
/// use dshot_engine::telemetry::decoder::decode_samples;
/// use dshot_engine::telemetry::encoder::encode_period_edges;
///
/// let samples = encode_period_edges(1000, 500).unwrap();
/// assert_eq!(decode_samples(&samples), Ok(1000));
/// ```
pub fn encode_period_edges(period: u32, start: u16) -> Option<[u16; CAPTURE_SAMPLES]> {
    let frame = ErpmFrame::from_period(period)?;
    Some(line_to_edges(gcr_to_line(data_to_gcr(frame.data())), start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decoder::{decode_period, decode_samples, line_to_data, DecodeError};
    use crate::telemetry::stats::TelemetryStats;

    #[test]
    fn test_from_period_exact() {
        let frame = ErpmFrame::from_period(300).unwrap();
        assert_eq!(frame.exponent, 0);
        assert_eq!(frame.mantissa, 300);
        assert_eq!(frame.period(), 300);

        let frame = ErpmFrame::from_period(511 << 7).unwrap();
        assert_eq!(frame.exponent, 7);
        assert_eq!(frame.mantissa, 511);
    }

    #[test]
    fn test_from_period_out_of_range() {
        assert!(ErpmFrame::from_period((511 << 7) + 128).is_none());
        assert!(ErpmFrame::from_period(u32::MAX).is_none());
    }

    #[test]
    fn test_stopped_motor_vectors() {
        let frame = ErpmFrame::from_period(65408).unwrap();
        assert_eq!(frame.data(), 0xFFF0);
        assert_eq!(gcr_to_line(data_to_gcr(0xFFF0)), 0x1AD6AE);
    }

    #[test]
    fn test_line_and_data_agree() {
        for data in [0x0000u16, 0x1234, 0xFFF0, 0xA5A5, 0x8001] {
            assert_eq!(line_to_data(gcr_to_line(data_to_gcr(data))), Ok(data));
        }
    }

    #[test]
    fn test_known_periods_decode() {
        let stats = TelemetryStats::new();

        let cases = [(1u32, 0u8), (250, 0), (511, 0), (1000, 1), (4096, 4), (65408, 7)];
        for (period, exponent) in cases {
            assert_eq!(ErpmFrame::from_period(period).unwrap().exponent, exponent);
            let samples = encode_period_edges(period, 1000).unwrap();
            assert_eq!(decode_period(&samples, &stats), period, "period {}", period);
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ok, 6);
        assert_eq!(snapshot.total(), 6);
    }

    #[test]
    fn test_corrupt_symbol_counts_bad_nibble() {
        let frame = ErpmFrame::from_period(2000).unwrap();
        // 0x00 is not a symbol; replace the second group
        let gcr = data_to_gcr(frame.data()) & !(0x1F << 5);
        let samples = line_to_edges(gcr_to_line(gcr), 800);

        let stats = TelemetryStats::new();
        assert_eq!(decode_period(&samples, &stats), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bad_nibble, 1);
        assert_eq!(snapshot.ok, 0);
        assert_eq!(snapshot.bad_crc, 0);
        assert_eq!(snapshot.no_signal, 0);
    }

    #[test]
    fn test_flipped_crc_bit_counts_bad_crc() {
        let frame = ErpmFrame::from_period(3000).unwrap();
        let samples = line_to_edges(gcr_to_line(data_to_gcr(frame.data() ^ 0x0001)), 800);

        assert!(matches!(decode_samples(&samples), Err(DecodeError::BadCrc { .. })));

        let stats = TelemetryStats::new();
        assert_eq!(decode_period(&samples, &stats), 0);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bad_crc, 1);
        assert_eq!(snapshot.ok + snapshot.bad_nibble + snapshot.no_signal, 0);
    }

    #[test]
    fn test_edges_fit_capture_buffer() {
        // Alternating symbols produce the most edges
        let samples = line_to_edges(gcr_to_line(data_to_gcr(0xAAAA)), 100);
        assert_eq!(samples[1], 100);
        assert_eq!(*samples.last().unwrap(), 0);
    }

    #[test]
    fn test_trailing_high_run_is_closed() {
        // Line ending in a one: last edge sits at start + 21 bits
        let line = 0x1FFFFF;
        let samples = line_to_edges(line, 100);
        assert_eq!(samples[2], 100 + 21 * 20);
        assert_eq!(samples[3], 0);
    }
}
