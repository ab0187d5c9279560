//! Trait abstraction for timer/DMA peripheral operations to enable testing

use std::time::Duration;

use crate::dshot::protocol::{ChannelMode, CAPTURE_SAMPLES};
use crate::error::PeripheralError;

/// Result type for collaborator calls
pub type PeripheralResult<T> = std::result::Result<T, PeripheralError>;

/// Output enable mask covering every channel
pub const ALL_CHANNELS: u32 = u32::MAX;

/// Timer/DMA operations the DShot engine needs from the board layer
///
/// Channel numbers are global output channels; timer indices refer to the
/// timer groups of the topology. Cache maintenance and register programming
/// are the implementor's business.
pub trait TimerPeripheral {
    /// Release a channel so it can be reconfigured
    fn unallocate_channel(&mut self, channel: u8) -> PeripheralResult<()>;

    /// Claim a channel in the given mode; `Busy` if another owner holds it
    fn init_channel(&mut self, channel: u8, mode: ChannelMode) -> PeripheralResult<()>;

    /// Put a timer into DShot burst mode
    fn set_dshot_mode(
        &mut self,
        timer: u8,
        frequency: u32,
        channel_count: usize,
    ) -> PeripheralResult<()>;

    /// Start the DMA burst of a timer group from `burst`
    fn start_burst(&mut self, timer: u8, burst: &[u32]) -> PeripheralResult<()>;

    /// Stop every transmit and capture transfer in flight
    fn stop_transfers(&mut self);

    /// Switch `channel` of `timer` to capture and start the capture DMA
    fn start_capture(&mut self, timer: u8, channel: u8, frequency: u32) -> PeripheralResult<()>;

    /// Stop the capture transfer and copy out the edge timestamps
    fn finish_capture(&mut self, timer: u8, samples: &mut [u16; CAPTURE_SAMPLES]);

    /// Enable or disable output drive on the channels in `channel_mask`
    fn set_enable(
        &mut self,
        enabled: bool,
        mode: ChannelMode,
        channel_mask: u32,
    ) -> PeripheralResult<()>;
}

/// One-shot deferred callback facility
///
/// After `delay`, the owner must invoke the driver's deferred-timeout event.
#[cfg_attr(test, mockall::automock)]
pub trait DeferredTimer {
    /// Schedule the deferred-timeout event, replacing any pending one
    fn call_after(&mut self, delay: Duration);

    /// Drop a pending deferred-timeout event
    fn cancel(&mut self);
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Calls seen by the mock, in order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Unallocate(u8),
        InitChannel(u8, ChannelMode),
        SetDshotMode { timer: u8, frequency: u32, channel_count: usize },
        StartBurst { timer: u8, burst: Vec<u32> },
        StopTransfers,
        StartCapture { timer: u8, channel: u8 },
        FinishCapture(u8),
        SetEnable { enabled: bool, mode: ChannelMode, mask: u32 },
    }

    /// Recording peripheral for testing
    #[derive(Clone, Default)]
    pub struct RecordingPeripheral {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub busy_channels: Arc<Mutex<Vec<u8>>>,
        pub failing_channels: Arc<Mutex<Vec<u8>>>,
        pub capture_samples: Arc<Mutex<[u16; CAPTURE_SAMPLES]>>,
    }

    impl RecordingPeripheral {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn set_busy(&self, channel: u8) {
            self.busy_channels.lock().unwrap().push(channel);
        }

        pub fn set_failing(&self, channel: u8) {
            self.failing_channels.lock().unwrap().push(channel);
        }

        pub fn set_capture_samples(&self, samples: [u16; CAPTURE_SAMPLES]) {
            *self.capture_samples.lock().unwrap() = samples;
        }

        pub fn last_burst(&self, timer: u8) -> Option<Vec<u32>> {
            self.get_calls().into_iter().rev().find_map(|call| match call {
                Call::StartBurst { timer: t, burst } if t == timer => Some(burst),
                _ => None,
            })
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl TimerPeripheral for RecordingPeripheral {
        fn unallocate_channel(&mut self, channel: u8) -> PeripheralResult<()> {
            self.push(Call::Unallocate(channel));
            Ok(())
        }

        fn init_channel(&mut self, channel: u8, mode: ChannelMode) -> PeripheralResult<()> {
            self.push(Call::InitChannel(channel, mode));
            if self.failing_channels.lock().unwrap().contains(&channel) {
                return Err(PeripheralError::Fault(format!("channel {} broken", channel)));
            }
            if self.busy_channels.lock().unwrap().contains(&channel) {
                return Err(PeripheralError::Busy);
            }
            Ok(())
        }

        fn set_dshot_mode(
            &mut self,
            timer: u8,
            frequency: u32,
            channel_count: usize,
        ) -> PeripheralResult<()> {
            self.push(Call::SetDshotMode {
                timer,
                frequency,
                channel_count,
            });
            Ok(())
        }

        fn start_burst(&mut self, timer: u8, burst: &[u32]) -> PeripheralResult<()> {
            self.push(Call::StartBurst {
                timer,
                burst: burst.to_vec(),
            });
            Ok(())
        }

        fn stop_transfers(&mut self) {
            self.push(Call::StopTransfers);
        }

        fn start_capture(
            &mut self,
            timer: u8,
            channel: u8,
            _frequency: u32,
        ) -> PeripheralResult<()> {
            self.push(Call::StartCapture { timer, channel });
            Ok(())
        }

        fn finish_capture(&mut self, timer: u8, samples: &mut [u16; CAPTURE_SAMPLES]) {
            self.push(Call::FinishCapture(timer));
            *samples = *self.capture_samples.lock().unwrap();
        }

        fn set_enable(
            &mut self,
            enabled: bool,
            mode: ChannelMode,
            channel_mask: u32,
        ) -> PeripheralResult<()> {
            self.push(Call::SetEnable {
                enabled,
                mode,
                mask: channel_mask,
            });
            Ok(())
        }
    }
}
