//! # Board Topology
//!
//! Describes which timers carry DShot bursts and how motor outputs map onto
//! their capture/compare channels, and checks the burst layout against the
//! reserved buffer space before anything is committed.

use std::collections::HashMap;

use serde::Deserialize;

use crate::dshot::burst::Lane;
use crate::dshot::protocol::*;
use crate::error::{DshotError, Result};

/// Slots reserved for all burst buffers together
pub const RESERVED_BURST_SLOTS: usize =
    MAX_DSHOT_TIMERS * MAX_CHANNELS_PER_TIMER * DSHOT_SLOTS_PER_MOTOR;

/// One timer that can drive a DShot burst
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimerSpec {
    /// Channels interleaved in the burst, counting unused gaps
    pub channel_count: usize,

    /// Lowest timer channel (1-based CCR index) in use
    #[serde(default = "default_lowest_channel")]
    pub lowest_channel: u8,

    /// Whether the board routes a burst DMA stream to this timer
    #[serde(default = "default_dshot_dma")]
    pub dshot_dma: bool,
}

/// One motor output
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Index into `Topology::timers`
    pub timer: u8,

    /// Timer channel (1-based CCR index)
    pub timer_channel: u8,
}

/// Board channel-to-timer mapping; motor `n` is `channels[n]`
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Topology {
    #[serde(default = "default_timers")]
    pub timers: Vec<TimerSpec>,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelSpec>,
}

fn default_lowest_channel() -> u8 { 1 }
fn default_dshot_dma() -> bool { true }

fn default_timers() -> Vec<TimerSpec> {
    vec![TimerSpec {
        channel_count: MAX_CHANNELS_PER_TIMER,
        lowest_channel: 1,
        dshot_dma: true,
    }]
}

fn default_channels() -> Vec<ChannelSpec> {
    (1..=MAX_CHANNELS_PER_TIMER as u8)
        .map(|timer_channel| ChannelSpec { timer: 0, timer_channel })
        .collect()
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            timers: default_timers(),
            channels: default_channels(),
        }
    }
}

impl Topology {
    /// Check that every burst fits the reserved space
    ///
    /// # Errors
    ///
    /// Returns `DshotError::BufferSizing` if a timer needs more than four
    /// channels or the buffers together exceed `RESERVED_BURST_SLOTS`, and
    /// `DshotError::Topology` for channels pointing at missing timers or two
    /// motors sharing one lane.
    pub fn validate(&self) -> Result<()> {
        if self.timers.len() > MAX_DSHOT_TIMERS {
            return Err(DshotError::Topology(format!(
                "{} timers configured, at most {} supported",
                self.timers.len(),
                MAX_DSHOT_TIMERS
            )));
        }

        let mut required = 0;
        for timer in &self.timers {
            if timer.channel_count == 0 {
                return Err(DshotError::Topology("timer with zero channels".to_string()));
            }

            let slots = timer.channel_count * DSHOT_SLOTS_PER_MOTOR;
            if timer.channel_count > MAX_CHANNELS_PER_TIMER {
                return Err(DshotError::BufferSizing {
                    required: slots,
                    capacity: MAX_CHANNELS_PER_TIMER * DSHOT_SLOTS_PER_MOTOR,
                });
            }

            required += slots;
            if required > RESERVED_BURST_SLOTS {
                return Err(DshotError::BufferSizing {
                    required,
                    capacity: RESERVED_BURST_SLOTS,
                });
            }
        }

        let mut lanes = HashMap::new();
        for (motor, channel) in self.channels.iter().enumerate() {
            let timer = self.timers.get(channel.timer as usize).ok_or_else(|| {
                DshotError::Topology(format!(
                    "motor {} refers to missing timer {}",
                    motor, channel.timer
                ))
            })?;

            let offset = self.lane_offset(channel, timer).ok_or_else(|| {
                DshotError::Topology(format!(
                    "motor {} uses timer channel {} outside timer {} (channels {}..{})",
                    motor,
                    channel.timer_channel,
                    channel.timer,
                    timer.lowest_channel,
                    timer.lowest_channel as usize + timer.channel_count
                ))
            })?;

            if let Some(other) = lanes.insert((channel.timer, offset), motor) {
                return Err(DshotError::Topology(format!(
                    "motors {} and {} share timer {} channel {}",
                    other, motor, channel.timer, channel.timer_channel
                )));
            }
        }

        Ok(())
    }

    /// Number of motor outputs
    pub fn motor_count(&self) -> usize {
        self.channels.len()
    }

    /// Mapping for one motor
    pub fn channel(&self, motor: usize) -> Option<&ChannelSpec> {
        self.channels.get(motor)
    }

    /// Burst lane of one motor
    pub fn lane(&self, motor: usize) -> Option<(u8, Lane)> {
        let channel = self.channels.get(motor)?;
        let timer = self.timers.get(channel.timer as usize)?;
        let offset = self.lane_offset(channel, timer)?;
        Some((channel.timer, Lane::new(timer.channel_count, offset)))
    }

    /// Whether the motor's timer has a burst DMA stream
    pub fn is_dshot_capable(&self, motor: usize) -> bool {
        self.channels
            .get(motor)
            .and_then(|channel| self.timers.get(channel.timer as usize))
            .map_or(false, |timer| timer.dshot_dma)
    }

    /// Mask of motors that can run DShot
    pub fn dshot_mask(&self) -> u32 {
        (0..self.channels.len().min(u32::BITS as usize))
            .filter(|&motor| self.is_dshot_capable(motor))
            .fold(0, |mask, motor| mask | 1 << motor)
    }

    fn lane_offset(&self, channel: &ChannelSpec, timer: &TimerSpec) -> Option<usize> {
        let offset = channel.timer_channel.checked_sub(timer.lowest_channel)? as usize;
        (offset < timer.channel_count).then_some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_timer_topology() -> Topology {
        Topology {
            timers: vec![
                TimerSpec { channel_count: 4, lowest_channel: 1, dshot_dma: true },
                TimerSpec { channel_count: 2, lowest_channel: 3, dshot_dma: true },
            ],
            channels: vec![
                ChannelSpec { timer: 0, timer_channel: 1 },
                ChannelSpec { timer: 0, timer_channel: 2 },
                ChannelSpec { timer: 0, timer_channel: 3 },
                ChannelSpec { timer: 0, timer_channel: 4 },
                ChannelSpec { timer: 1, timer_channel: 3 },
                ChannelSpec { timer: 1, timer_channel: 4 },
            ],
        }
    }

    #[test]
    fn test_default_topology() {
        let topology = Topology::default();
        assert!(topology.validate().is_ok());
        assert_eq!(topology.motor_count(), 4);
        assert_eq!(topology.dshot_mask(), 0x0F);
        assert_eq!(topology.lane(3), Some((0, Lane::new(4, 3))));
    }

    #[test]
    fn test_lanes_on_second_timer() {
        let topology = two_timer_topology();
        assert!(topology.validate().is_ok());
        assert_eq!(topology.lane(4), Some((1, Lane::new(2, 0))));
        assert_eq!(topology.lane(5), Some((1, Lane::new(2, 1))));
        assert_eq!(topology.lane(6), None);
    }

    #[test]
    fn test_timer_with_too_many_channels() {
        let mut topology = Topology::default();
        topology.timers[0].channel_count = 5;

        match topology.validate() {
            Err(DshotError::BufferSizing { required, capacity }) => {
                assert_eq!(required, 85);
                assert_eq!(capacity, 68);
            }
            other => panic!("Expected BufferSizing error, got: {:?}", other),
        }
    }

    #[test]
    fn test_too_many_timers() {
        let mut topology = Topology::default();
        topology.timers = vec![topology.timers[0].clone(); MAX_DSHOT_TIMERS + 1];
        assert!(matches!(topology.validate(), Err(DshotError::Topology(_))));
    }

    #[test]
    fn test_channel_on_missing_timer() {
        let mut topology = Topology::default();
        topology.channels.push(ChannelSpec { timer: 3, timer_channel: 1 });
        assert!(matches!(topology.validate(), Err(DshotError::Topology(_))));
    }

    #[test]
    fn test_channel_outside_timer_range() {
        let mut topology = two_timer_topology();
        topology.channels[4].timer_channel = 2; // below lowest_channel 3
        assert!(matches!(topology.validate(), Err(DshotError::Topology(_))));
    }

    #[test]
    fn test_shared_lane_rejected() {
        let mut topology = two_timer_topology();
        topology.channels[5].timer_channel = 3; // same lane as motor 4
        let err = topology.validate().unwrap_err();
        assert!(matches!(err, DshotError::Topology(_)));
        assert!(err.to_string().contains("motors 4 and 5"));

        // Motor 2 already uses channel 3 of timer 0; same number on timer 1 is fine
        topology.channels[5] = ChannelSpec { timer: 1, timer_channel: 4 };
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn test_dshot_mask_skips_timers_without_dma() {
        let mut topology = two_timer_topology();
        topology.timers[1].dshot_dma = false;
        assert_eq!(topology.dshot_mask(), 0x0F);
        assert!(!topology.is_dshot_capable(5));
        assert!(!topology.is_dshot_capable(42));
    }
}
