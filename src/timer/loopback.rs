//! Simulated timer peripheral with ESCs answering on the capture line
//!
//! Used by the bench binary and tests to run the full transmit/capture cycle
//! without hardware. Each captured motor answers with the edge timestamps of
//! its configured eRPM period.

use std::time::Duration;

use tracing::trace;

use super::io_trait::{DeferredTimer, PeripheralResult, TimerPeripheral};
use crate::dshot::protocol::{ChannelMode, CAPTURE_SAMPLES, DSHOT_SLOTS_PER_MOTOR, MOTOR_PWM_BIT_1};
use crate::error::PeripheralError;
use crate::telemetry::encoder::encode_period_edges;

/// Free-running capture timer step between responses
const COUNTER_STEP: u16 = 7919;

/// Response start times stay below this
const COUNTER_WRAP: u32 = 64_000;

/// In-memory timer/DMA peripheral
#[derive(Debug, Clone)]
pub struct LoopbackPeripheral {
    esc_periods: Vec<Option<u32>>,
    channel_modes: Vec<Option<ChannelMode>>,
    last_bursts: Vec<Vec<u32>>,
    capturing: Option<(u8, u8)>,
    enabled: bool,
    bursts: u64,
    counter: u16,
}

impl LoopbackPeripheral {
    /// Create a peripheral where motor `n` answers with `esc_periods[n]`
    pub fn new(esc_periods: &[u32]) -> Self {
        Self {
            esc_periods: esc_periods.iter().copied().map(Some).collect(),
            channel_modes: Vec::new(),
            last_bursts: Vec::new(),
            capturing: None,
            enabled: false,
            bursts: 0,
            counter: 1000,
        }
    }

    /// Change the period a motor answers with; `None` leaves the line silent
    pub fn set_esc_period(&mut self, motor: usize, period: Option<u32>) {
        if motor >= self.esc_periods.len() {
            self.esc_periods.resize(motor + 1, None);
        }
        self.esc_periods[motor] = period;
    }

    /// Bursts started so far
    pub fn bursts(&self) -> u64 {
        self.bursts
    }

    /// Whether outputs are driven
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mode a channel was last initialized in
    pub fn channel_mode(&self, channel: u8) -> Option<ChannelMode> {
        self.channel_modes.get(channel as usize).copied().flatten()
    }

    /// Frame sent on `lane` of `timer` in the last burst
    pub fn last_frame(&self, timer: u8, lane: usize) -> Option<u16> {
        let burst = self.last_bursts.get(timer as usize)?;
        let stride = burst.len() / DSHOT_SLOTS_PER_MOTOR;
        if lane >= stride {
            return None;
        }

        let frame = (0..DSHOT_SLOTS_PER_MOTOR - 1)
            .map(|bit| burst[bit * stride + lane])
            .fold(0u16, |frame, code| frame << 1 | u16::from(code == MOTOR_PWM_BIT_1));
        Some(frame)
    }

    fn channel_slot(&mut self, channel: u8) -> &mut Option<ChannelMode> {
        let index = channel as usize;
        if index >= self.channel_modes.len() {
            self.channel_modes.resize(index + 1, None);
        }
        &mut self.channel_modes[index]
    }
}

impl TimerPeripheral for LoopbackPeripheral {
    fn unallocate_channel(&mut self, channel: u8) -> PeripheralResult<()> {
        *self.channel_slot(channel) = None;
        Ok(())
    }

    fn init_channel(&mut self, channel: u8, mode: ChannelMode) -> PeripheralResult<()> {
        let slot = self.channel_slot(channel);
        if slot.is_some() {
            return Err(PeripheralError::Busy);
        }
        *slot = Some(mode);
        Ok(())
    }

    fn set_dshot_mode(
        &mut self,
        _timer: u8,
        _frequency: u32,
        channel_count: usize,
    ) -> PeripheralResult<()> {
        if channel_count == 0 {
            return Err(PeripheralError::Fault("empty burst".to_string()));
        }
        Ok(())
    }

    fn start_burst(&mut self, timer: u8, burst: &[u32]) -> PeripheralResult<()> {
        let index = timer as usize;
        if index >= self.last_bursts.len() {
            self.last_bursts.resize(index + 1, Vec::new());
        }
        self.last_bursts[index] = burst.to_vec();
        self.bursts += 1;
        Ok(())
    }

    fn stop_transfers(&mut self) {
        self.capturing = None;
    }

    fn start_capture(&mut self, timer: u8, channel: u8, _frequency: u32) -> PeripheralResult<()> {
        if self.channel_mode(channel) != Some(ChannelMode::CaptureDma) {
            return Err(PeripheralError::Fault(format!(
                "channel {} not configured for capture",
                channel
            )));
        }
        self.capturing = Some((timer, channel));
        Ok(())
    }

    fn finish_capture(&mut self, timer: u8, samples: &mut [u16; CAPTURE_SAMPLES]) {
        let Some((capture_timer, channel)) = self.capturing.take() else {
            return;
        };
        if capture_timer != timer || !self.enabled {
            return;
        }

        let period = self.esc_periods.get(channel as usize).copied().flatten();
        if let Some(edges) = period.and_then(|period| encode_period_edges(period, self.counter)) {
            *samples = edges;
        }
        trace!("Loopback capture on channel {}: {:?}", channel, period);

        // A response must not wrap through zero, it would read as the terminator
        let next = (u32::from(self.counter) + u32::from(COUNTER_STEP)) % COUNTER_WRAP + 1;
        self.counter = next as u16;
    }

    fn set_enable(
        &mut self,
        enabled: bool,
        _mode: ChannelMode,
        _channel_mask: u32,
    ) -> PeripheralResult<()> {
        self.enabled = enabled;
        Ok(())
    }
}

/// Deferred timer that leaves firing to its owner
#[derive(Debug, Clone, Default)]
pub struct LoopbackTimer {
    pending: Option<Duration>,
}

impl LoopbackTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the scheduled delay, if any
    pub fn take_pending(&mut self) -> Option<Duration> {
        self.pending.take()
    }
}

impl DeferredTimer for LoopbackTimer {
    fn call_after(&mut self, delay: Duration) {
        self.pending = Some(delay);
    }

    fn cancel(&mut self) {
        self.pending = None;
    }
}
