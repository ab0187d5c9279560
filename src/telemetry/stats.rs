//! # Telemetry Decode Statistics
//!
//! Process-lifetime tallies of decode outcomes. Counters are only ever
//! incremented; diagnostics read them through [`TelemetryStats::snapshot`].

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

/// Result class of one decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeOutcome {
    /// Frame decoded and CRC matched
    Ok,
    /// A 5-bit group was not a valid symbol
    BadNibble,
    /// CRC mismatch
    BadCrc,
    /// No edges captured
    NoSignal,
}

/// Decode outcome counters
#[derive(Debug, Default)]
pub struct TelemetryStats {
    ok: AtomicU32,
    bad_nibble: AtomicU32,
    bad_crc: AtomicU32,
    no_signal: AtomicU32,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ok: u32,
    pub bad_nibble: u32,
    pub bad_crc: u32,
    pub no_signal: u32,
}

impl StatsSnapshot {
    /// Total decode attempts
    pub fn total(&self) -> u32 {
        self.ok
            .wrapping_add(self.bad_nibble)
            .wrapping_add(self.bad_crc)
            .wrapping_add(self.no_signal)
    }

    /// Fraction of attempts that decoded, 0.0 when nothing was attempted
    pub fn success_ratio(&self) -> f32 {
        match self.total() {
            0 => 0.0,
            total => self.ok as f32 / total as f32,
        }
    }
}

impl TelemetryStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one decode outcome
    pub fn record(&self, outcome: DecodeOutcome) {
        let counter = match outcome {
            DecodeOutcome::Ok => &self.ok,
            DecodeOutcome::BadNibble => &self.bad_nibble,
            DecodeOutcome::BadCrc => &self.bad_crc,
            DecodeOutcome::NoSignal => &self.no_signal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ok: self.ok.load(Ordering::Relaxed),
            bad_nibble: self.bad_nibble.load(Ordering::Relaxed),
            bad_crc: self.bad_crc.load(Ordering::Relaxed),
            no_signal: self.no_signal.load(Ordering::Relaxed),
        }
    }
}
