//! # Capture Cycle Controller
//!
//! Round-robin eRPM capture, one motor per transmit burst.
//!
//! ```text
//!            trigger                 transfer complete
//!   Idle ────────────► Transmitting ───────────────────► CaptureArmed
//!                        ▲      │ (batch pending: skip)        │
//!                        │      └──────────────┘               │ deferred timeout
//!                        │ trigger                             ▼
//!                        └───────────────────────────────── Decoding
//! ```
//!
//! Both events come from the collaborator: the burst DMA completion handler
//! and the deferred timer. They never overlap; the timer is only scheduled at
//! the end of the transfer-complete handler, and no new burst completes before
//! the timeout has put the channels back into transmit mode.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::decoder::decode_period;
use super::mailbox::PeriodMailbox;
use super::stats::TelemetryStats;
use crate::dshot::protocol::*;
use crate::timer::io_trait::{DeferredTimer, PeripheralResult, TimerPeripheral};

/// Where the capture cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// No burst started yet (or disarmed)
    Idle,
    /// A transmit burst is on the wire
    Transmitting,
    /// Capture running for `motor` on `timer`, waiting for the settle delay
    CaptureArmed { motor: usize, timer: u8 },
    /// Capture decoded; waiting for the next burst
    Decoding,
}

/// Capture request for the active motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTarget {
    /// Motor index (also the output channel number)
    pub motor: usize,
    /// Timer group owning the channel
    pub timer: u8,
    /// DShot bit rate, used to pace the capture timer
    pub frequency: u32,
}

/// Result of one completed capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    /// Motor that was sampled
    pub motor: usize,
    /// Decoded period, 0 on failure
    pub period: u32,
    /// Whether this capture completed a batch
    pub batch_ready: bool,
}

/// Round-robin capture state machine
#[derive(Debug)]
pub struct CaptureCycle {
    state: CycleState,
    motor: usize,
    samples: [u16; CAPTURE_SAMPLES],
    settle_delay: Duration,
    mailbox: Arc<PeriodMailbox>,
    stats: Arc<TelemetryStats>,
}

impl CaptureCycle {
    /// Create a controller starting at motor 0
    pub fn new(
        settle_delay: Duration,
        mailbox: Arc<PeriodMailbox>,
        stats: Arc<TelemetryStats>,
    ) -> Self {
        Self {
            state: CycleState::Idle,
            motor: 0,
            samples: [0; CAPTURE_SAMPLES],
            settle_delay,
            mailbox,
            stats,
        }
    }

    /// Current state
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Motor the next capture will sample
    pub fn active_motor(&self) -> usize {
        self.motor
    }

    /// Wait between arming and decoding
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// A transmit burst was started
    ///
    /// A capture that is already armed keeps running; the burst completion
    /// that follows is skipped instead.
    pub fn on_transmit_started(&mut self) {
        if !matches!(self.state, CycleState::CaptureArmed { .. }) {
            self.state = CycleState::Transmitting;
        }
    }

    /// Motor to capture after the current burst, if any
    ///
    /// `None` while not transmitting, while the previous batch has not been
    /// drained, or when the active index is outside the monitored range.
    pub fn capture_candidate(&self) -> Option<usize> {
        if self.state != CycleState::Transmitting {
            return None;
        }

        if self.mailbox.is_ready() {
            trace!("Periods not drained yet, skipping capture");
            return None;
        }

        (self.motor < TELEMETRY_MOTORS).then_some(self.motor)
    }

    /// Switch the target channel to capture and schedule the decode
    ///
    /// Stops all transfers, clears the sample buffer, reconfigures the channel
    /// for capture, starts the capture transfer, then asks `timer` for the
    /// deferred timeout after the settle delay.
    ///
    /// # Errors
    ///
    /// Returns the peripheral error if the channel could not be switched; the
    /// state stays `Transmitting` and nothing is scheduled.
    pub fn arm<P, T>(
        &mut self,
        target: CaptureTarget,
        peripheral: &mut P,
        timer: &mut T,
    ) -> PeripheralResult<()>
    where
        P: TimerPeripheral + ?Sized,
        T: DeferredTimer + ?Sized,
    {
        let channel = target.motor as u8;

        peripheral.stop_transfers();
        self.samples = [0; CAPTURE_SAMPLES];

        peripheral.unallocate_channel(channel)?;
        peripheral.init_channel(channel, ChannelMode::CaptureDma)?;
        peripheral.set_enable(true, ChannelMode::CaptureDma, 1 << channel)?;
        peripheral.start_capture(target.timer, channel, target.frequency)?;

        self.state = CycleState::CaptureArmed {
            motor: target.motor,
            timer: target.timer,
        };
        timer.call_after(self.settle_delay);

        debug!(
            "Capture armed for motor {} on timer {}, decoding in {:?}",
            target.motor, target.timer, self.settle_delay
        );
        Ok(())
    }

    /// Collect and decode the armed capture, then move to the next motor
    ///
    /// Returns `None` for a timeout that has no armed capture behind it.
    pub fn complete<P>(&mut self, peripheral: &mut P) -> Option<CaptureReport>
    where
        P: TimerPeripheral + ?Sized,
    {
        let (motor, timer) = match self.state {
            CycleState::CaptureArmed { motor, timer } => (motor, timer),
            _ => return None,
        };

        peripheral.finish_capture(timer, &mut self.samples);
        self.state = CycleState::Decoding;

        let period = decode_period(&self.samples, &self.stats);
        self.samples = [0; CAPTURE_SAMPLES];

        self.mailbox.store(motor, period);
        let batch_ready = motor == TELEMETRY_MOTORS - 1;
        if batch_ready {
            self.mailbox.publish();
        }
        self.motor = (motor + 1) % TELEMETRY_MOTORS;

        trace!("Motor {} period {}", motor, period);
        Some(CaptureReport {
            motor,
            period,
            batch_ready,
        })
    }

    /// Give up on the active motor for this round
    ///
    /// Stores a zero period and advances exactly like a failed decode, without
    /// touching the decode counters.
    pub fn skip_motor(&mut self) -> bool {
        let motor = self.motor;
        self.mailbox.store(motor, 0);
        let batch_ready = motor == TELEMETRY_MOTORS - 1;
        if batch_ready {
            self.mailbox.publish();
        }
        self.motor = (motor + 1) % TELEMETRY_MOTORS;
        batch_ready
    }

    /// Drop an armed capture without decoding it
    pub fn abandon(&mut self) {
        if matches!(self.state, CycleState::CaptureArmed { .. }) {
            debug!("Abandoning capture for motor {}", self.motor);
        }
        self.samples = [0; CAPTURE_SAMPLES];
        self.state = CycleState::Idle;
    }
}
