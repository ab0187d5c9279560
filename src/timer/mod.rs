//! # DShot Timer Driver
//!
//! Drives DShot bursts on timer/DMA groups and collects bidirectional
//! telemetry between bursts.
//!
//! This module handles:
//! - Validating the burst layout against the board topology
//! - Writing throttle frames into each timer group's burst buffer
//! - Switching channels into DShot output mode and starting bursts
//! - Arming/disarming the outputs
//! - Running the capture cycle from the transfer-complete and deferred-timeout events

pub mod io_trait;
pub mod topology;
pub mod loopback;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::dshot::burst::BurstBuffer;
use crate::dshot::encoder::encode_frame;
use crate::dshot::protocol::*;
use crate::error::{DshotError, PeripheralError, Result};
use crate::telemetry::capture::{CaptureCycle, CaptureTarget, CycleState};
use crate::telemetry::mailbox::PeriodMailbox;
use crate::telemetry::stats::TelemetryStats;
use io_trait::{DeferredTimer, PeripheralResult, TimerPeripheral, ALL_CHANNELS};
use topology::Topology;

/// Burst state of one timer
#[derive(Debug, Clone)]
struct TimerGroup {
    index: u8,
    buffer: BurstBuffer,
    initialized: bool,
}

/// DShot driver for one board
///
/// Owns every timer group's burst buffer and the capture cycle. The two
/// hardware events must be delivered by the collaborator:
/// [`on_transfer_complete`](Self::on_transfer_complete) after each burst and
/// [`on_deferred_timeout`](Self::on_deferred_timeout) when the
/// [`DeferredTimer`] fires.
pub struct DshotDriver<P, T> {
    topology: Topology,
    bidirectional: bool,
    frequency: u32,
    channel_mask: u32,
    groups: Vec<TimerGroup>,
    capture: CaptureCycle,
    mailbox: Arc<PeriodMailbox>,
    stats: Arc<TelemetryStats>,
    peripheral: P,
    timer: T,
}

impl<P, T> std::fmt::Debug for DshotDriver<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DshotDriver")
            .field("bidirectional", &self.bidirectional)
            .field("frequency", &self.frequency)
            .field("channel_mask", &format_args!("{:#x}", self.channel_mask))
            .field("capture", &self.capture.state())
            .finish_non_exhaustive()
    }
}

impl<P: TimerPeripheral, T: DeferredTimer> DshotDriver<P, T> {
    /// Create an uninitialized driver
    ///
    /// # Arguments
    ///
    /// * `topology` - Board timer/channel mapping
    /// * `bidirectional` - Inverted checksum and eRPM capture
    /// * `settle_delay` - Wait between arming a capture and decoding it
    /// * `peripheral` - Timer/DMA collaborator
    /// * `timer` - Deferred callback collaborator
    pub fn new(
        topology: Topology,
        bidirectional: bool,
        settle_delay: Duration,
        peripheral: P,
        timer: T,
    ) -> Self {
        let mailbox = Arc::new(PeriodMailbox::new());
        let stats = Arc::new(TelemetryStats::new());

        Self {
            topology,
            bidirectional,
            frequency: 0,
            channel_mask: 0,
            groups: Vec::new(),
            capture: CaptureCycle::new(settle_delay, Arc::clone(&mailbox), Arc::clone(&stats)),
            mailbox,
            stats,
            peripheral,
            timer,
        }
    }

    /// Create an uninitialized driver from configuration
    pub fn from_config(config: &Config, peripheral: P, timer: T) -> Self {
        Self::new(
            config.topology.clone(),
            config.dshot.bidirectional,
            config.capture.settle_delay(),
            peripheral,
            timer,
        )
    }

    /// Lay out the burst buffers for the topology
    ///
    /// # Arguments
    ///
    /// * `channel_mask` - Motors to drive
    /// * `frequency` - DShot bit rate in Hz
    ///
    /// # Returns
    ///
    /// * `Result<u32>` - Mask of motors that will be driven
    ///
    /// # Errors
    ///
    /// Returns `DshotError::BufferSizing` if the layout exceeds the reserved
    /// burst space, `DshotError::Topology` for inconsistent boards and
    /// `DshotError::Protocol` for unsupported frequencies. Nothing is changed
    /// on error.
    pub fn initialize(&mut self, channel_mask: u32, frequency: u32) -> Result<u32> {
        DshotSpeed::from_frequency(frequency)?;
        self.topology.validate()?;

        let groups = self
            .topology
            .timers
            .iter()
            .enumerate()
            .map(|(index, spec)| -> Result<TimerGroup> {
                let buffer = BurstBuffer::new(spec.channel_count).ok_or(DshotError::BufferSizing {
                    required: spec.channel_count * DSHOT_SLOTS_PER_MOTOR,
                    capacity: MAX_CHANNELS_PER_TIMER * DSHOT_SLOTS_PER_MOTOR,
                })?;
                Ok(TimerGroup {
                    index: index as u8,
                    buffer,
                    initialized: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let init_mask = channel_mask & self.topology.dshot_mask();
        if init_mask == 0 {
            warn!("No DShot-capable channels in mask {:#x}", channel_mask);
        }

        self.groups = groups;
        self.frequency = frequency;
        self.channel_mask = init_mask;

        info!(
            "DShot initialized: {} timer(s), channels {:#x}, {} Hz, bidirectional {}",
            self.groups.len(),
            init_mask,
            frequency,
            self.bidirectional
        );
        Ok(init_mask)
    }

    /// Write one motor's frame into its timer group's burst buffer
    ///
    /// Motors outside the initialized mask are ignored. Throttle is not
    /// re-validated; bits above 11 are dropped.
    pub fn set_command(&mut self, motor: usize, throttle: u16, telemetry: bool) {
        if motor >= u32::BITS as usize || self.channel_mask & (1 << motor) == 0 {
            trace!("Ignoring command for motor {} outside channel mask", motor);
            return;
        }

        let Some((timer, lane)) = self.topology.lane(motor) else {
            return;
        };

        let frame = encode_frame(throttle, telemetry, self.checksum_mode());
        if let Some(group) = self.groups.get_mut(timer as usize) {
            group.buffer.write_frame(lane, frame);
        }
    }

    /// Write a command
    pub fn apply(&mut self, command: &Command) {
        self.set_command(command.motor, command.throttle, command.telemetry);
    }

    /// Program the channels for DShot and start every timer group's burst
    ///
    /// # Errors
    ///
    /// Channel allocation returning `Busy` is tolerated; any other peripheral
    /// failure is returned.
    ///
    /// While a capture is armed the call does nothing, so the capture channel
    /// keeps sampling until the deferred timeout.
    pub fn trigger_transmission(&mut self) -> Result<()> {
        if let CycleState::CaptureArmed { motor, .. } = self.capture.state() {
            debug!("Capture armed for motor {}, skipping burst", motor);
            return Ok(());
        }

        let mode = self.transmit_mode();
        self.init_transmit_channels(mode)?;

        self.capture.on_transmit_started();

        for group in self.groups.iter().filter(|group| group.initialized) {
            self.peripheral
                .set_dshot_mode(group.index, self.frequency, group.buffer.channel_count())?;
            self.peripheral.start_burst(group.index, group.buffer.as_slice())?;
        }

        self.peripheral.set_enable(true, mode, ALL_CHANNELS)?;
        Ok(())
    }

    /// Enable or disable output drive on all channels
    ///
    /// Disarming also drops a capture in progress.
    pub fn set_armed(&mut self, armed: bool) -> Result<()> {
        self.peripheral.set_enable(armed, self.transmit_mode(), ALL_CHANNELS)?;

        if !armed {
            if matches!(self.capture.state(), CycleState::CaptureArmed { .. }) {
                self.timer.cancel();
                self.peripheral.stop_transfers();
            }
            self.capture.abandon();
        }

        info!("DShot outputs {}", if armed { "armed" } else { "disarmed" });
        Ok(())
    }

    /// Copy out a complete batch of periods
    ///
    /// Returns `false` without touching anything if no batch is ready or
    /// `out` does not hold exactly four elements.
    pub fn drain_periods(&self, out: &mut [u32]) -> bool {
        self.mailbox.drain(out)
    }

    /// Burst DMA finished: start capturing the active motor's response
    pub fn on_transfer_complete(&mut self) {
        if !self.bidirectional {
            return;
        }

        let Some(motor) = self.capture.capture_candidate() else {
            return;
        };

        let timer = match self.topology.channel(motor) {
            Some(channel) if self.channel_mask & (1 << motor) != 0 => channel.timer,
            _ => {
                trace!("Motor {} not driven, skipping its capture slot", motor);
                self.capture.skip_motor();
                return;
            }
        };

        let target = CaptureTarget {
            motor,
            timer,
            frequency: self.frequency,
        };

        if let Err(e) = self.capture.arm(target, &mut self.peripheral, &mut self.timer) {
            warn!("Failed to arm capture for motor {}: {}", motor, e);
            self.restore_transmit();
            self.capture.skip_motor();
        }
    }

    /// Settle delay elapsed: decode the capture and go back to transmit mode
    pub fn on_deferred_timeout(&mut self) {
        let Some(report) = self.capture.complete(&mut self.peripheral) else {
            trace!("Deferred timeout without armed capture");
            return;
        };

        self.restore_transmit();

        if report.batch_ready {
            debug!("eRPM batch ready");
        }
    }

    /// Shared handle to the period batch, for a consumer on another thread
    pub fn mailbox(&self) -> Arc<PeriodMailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Shared handle to the decode counters
    pub fn stats(&self) -> Arc<TelemetryStats> {
        Arc::clone(&self.stats)
    }

    /// Current capture cycle state
    pub fn capture_state(&self) -> CycleState {
        self.capture.state()
    }

    /// Motor the next capture will sample
    pub fn active_motor(&self) -> usize {
        self.capture.active_motor()
    }

    /// Motors being driven
    pub fn channel_mask(&self) -> u32 {
        self.channel_mask
    }

    /// Active burst slots of a timer group
    pub fn burst(&self, timer: u8) -> Option<&[u32]> {
        self.groups.get(timer as usize).map(|group| group.buffer.as_slice())
    }

    /// Timer/DMA collaborator
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Deferred callback collaborator
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    fn checksum_mode(&self) -> ChecksumMode {
        ChecksumMode::for_bidirectional(self.bidirectional)
    }

    fn transmit_mode(&self) -> ChannelMode {
        ChannelMode::transmit(self.bidirectional)
    }

    /// Put every driven channel back into DShot mode after a capture
    fn restore_transmit(&mut self) {
        if let Err(e) = self.init_transmit_channels(self.transmit_mode()) {
            warn!("Failed to restore DShot output mode, transmit may not re-arm: {}", e);
        }
    }

    /// Reinitialize every driven channel; `Busy` counts as already ours
    fn init_transmit_channels(&mut self, mode: ChannelMode) -> PeripheralResult<()> {
        for motor in 0..self.topology.motor_count().min(u32::BITS as usize) {
            if self.channel_mask & (1 << motor) == 0 {
                continue;
            }

            let Some(timer) = self.topology.channel(motor).map(|channel| channel.timer) else {
                continue;
            };

            let channel = motor as u8;
            self.peripheral.unallocate_channel(channel)?;

            match self.peripheral.init_channel(channel, mode) {
                Ok(()) => {}
                Err(PeripheralError::Busy) => {
                    debug!("Channel {} busy, treating as already initialized", channel);
                }
                Err(e) => return Err(e),
            }

            if let Some(group) = self.groups.get_mut(timer as usize) {
                group.initialized = true;
            }
        }

        Ok(())
    }
}
