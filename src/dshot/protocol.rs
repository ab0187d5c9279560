//! # DShot Protocol Constants and Types
//!
//! Core protocol definitions for DShot frames, burst slots and telemetry capture.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DshotError, Result};

/// Number of bits in a DShot frame
pub const DSHOT_FRAME_BITS: usize = 16;

/// Burst slots per motor: 16 data bits + 1 trailing zero (inter-frame gap)
pub const DSHOT_SLOTS_PER_MOTOR: usize = DSHOT_FRAME_BITS + 1;

/// Bit position of the throttle field within a frame
pub const DSHOT_THROTTLE_POSITION: u16 = 5;

/// Bit position of the telemetry request flag within a frame
pub const DSHOT_TELEMETRY_POSITION: u16 = 4;

/// Throttle value range (11-bit: 0-2047)
pub const DSHOT_THROTTLE_MIN: u16 = 0;
pub const DSHOT_THROTTLE_MAX: u16 = 2047;

/// First non-reserved throttle value (0-47 are commands / disarmed)
pub const DSHOT_THROTTLE_FIRST_STEP: u16 = 48;

/// Duty code for a `1` bit (long pulse)
pub const MOTOR_PWM_BIT_1: u32 = 14;

/// Duty code for a `0` bit (short pulse)
pub const MOTOR_PWM_BIT_0: u32 = 7;

/// Capture/compare channels per timer (CCR1-CCR4)
pub const MAX_CHANNELS_PER_TIMER: usize = 4;

/// Timers that may carry a DShot burst
pub const MAX_DSHOT_TIMERS: usize = 8;

/// Raw edge timestamps captured per telemetry response
pub const CAPTURE_SAMPLES: usize = 32;

/// Number of motors monitored by the round-robin capture cycle
pub const TELEMETRY_MOTORS: usize = 4;

/// Timer ticks per telemetry bit
pub const TELEMETRY_TICKS_PER_BIT: u32 = 20;

/// Bias added before dividing an edge interval into bits
pub const TELEMETRY_ROUNDING_BIAS: u32 = 5;

/// Width of a telemetry frame after run-length reconstruction
pub const TELEMETRY_FRAME_BITS: u32 = 21;

/// Default wait between arming capture and decoding (ESC answers after ~85 µs)
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_micros(150);

/// Checksum polarity
///
/// Bidirectional ESCs recognise an inverted checksum as the request to answer
/// every frame with an eRPM telemetry burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumMode {
    /// Plain XOR fold (unidirectional DShot)
    Normal,
    /// Complemented XOR fold (bidirectional DShot)
    Inverted,
}

impl ChecksumMode {
    /// Polarity used for the given bidirectional setting
    pub fn for_bidirectional(bidirectional: bool) -> Self {
        if bidirectional {
            ChecksumMode::Inverted
        } else {
            ChecksumMode::Normal
        }
    }
}

/// Timer channel operating mode requested from the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Normal DShot output
    Dshot,
    /// Inverted DShot output (idle high, bidirectional)
    DshotInverted,
    /// Input capture of both edges via DMA
    CaptureDma,
}

impl ChannelMode {
    /// Transmit mode used for the given bidirectional setting
    pub fn transmit(bidirectional: bool) -> Self {
        if bidirectional {
            ChannelMode::DshotInverted
        } else {
            ChannelMode::Dshot
        }
    }
}

/// DShot protocol variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DshotSpeed {
    Dshot150,
    Dshot300,
    Dshot600,
    Dshot1200,
}

impl DshotSpeed {
    /// Bit rate in bits/second
    pub fn bitrate(&self) -> u32 {
        match self {
            DshotSpeed::Dshot150 => 150_000,
            DshotSpeed::Dshot300 => 300_000,
            DshotSpeed::Dshot600 => 600_000,
            DshotSpeed::Dshot1200 => 1_200_000,
        }
    }

    /// Look up the variant running at `frequency_hz`
    ///
    /// # Errors
    ///
    /// Returns `DshotError::Protocol` for rates that are not a DShot variant
    pub fn from_frequency(frequency_hz: u32) -> Result<Self> {
        match frequency_hz {
            150_000 => Ok(DshotSpeed::Dshot150),
            300_000 => Ok(DshotSpeed::Dshot300),
            600_000 => Ok(DshotSpeed::Dshot600),
            1_200_000 => Ok(DshotSpeed::Dshot1200),
            other => Err(DshotError::Protocol(format!(
                "unsupported DShot frequency {} Hz",
                other
            ))),
        }
    }

    /// Duration of one 16-bit frame on the wire
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(DSHOT_FRAME_BITS as u64 * 1_000_000_000 / self.bitrate() as u64)
    }
}

/// One throttle command for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Motor index (0..N-1)
    pub motor: usize,

    /// Raw DShot throttle value (0-2047, 0-47 reserved)
    pub throttle: u16,

    /// Ask the ESC for a telemetry report
    pub telemetry: bool,
}

impl Command {
    /// Create a new command
    pub fn new(motor: usize, throttle: u16, telemetry: bool) -> Self {
        Self {
            motor,
            throttle,
            telemetry,
        }
    }

    /// Whether the throttle value is in the reserved (no movement) range
    pub fn is_reserved(&self) -> bool {
        self.throttle < DSHOT_THROTTLE_FIRST_STEP
    }
}

/// Clamp a throttle value to the 11-bit DShot range
pub fn clamp_throttle(value: u16) -> u16 {
    value.min(DSHOT_THROTTLE_MAX)
}
