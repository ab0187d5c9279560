//! # DShot Burst Layout
//!
//! Expands frames into per-bit duty codes inside the transmit buffer shared by
//! every channel of one timer.
//!
//! The DMA burst writes one slot per enabled capture/compare register on every
//! timer update, so channels are interleaved with a stride equal to the
//! timer's channel count:
//!
//! ```text
//! stride = 3
//! slot:  0    1    2    3    4    5   ...  48   49   50
//!        m0b15 m1b15 m2b15 m0b14 m1b14 m2b14 ... m0gap m1gap m2gap
//! ```
//!
//! Each motor owns a disjoint lane; the 17th slot of every lane stays zero.

use super::protocol::*;

/// Slots reserved per timer group (largest supported timer)
pub const BURST_CAPACITY: usize = MAX_CHANNELS_PER_TIMER * DSHOT_SLOTS_PER_MOTOR;

/// Position of one motor inside a burst buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    /// Distance between consecutive bits of the same motor
    stride: usize,
    /// Index of the motor's first slot
    offset: usize,
}

impl Lane {
    /// Create a lane; `offset` must be below `stride`
    pub fn new(stride: usize, offset: usize) -> Self {
        debug_assert!(offset < stride, "lane offset {} outside stride {}", offset, stride);
        Self { stride, offset }
    }

    /// Distance between consecutive bits
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Index of the first slot
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Slot index holding bit `bit` (0 = MSB) of this lane
    pub fn slot(&self, bit: usize) -> usize {
        bit * self.stride + self.offset
    }
}

/// Duty code for one frame bit
pub fn duty_code(bit: bool) -> u32 {
    if bit {
        MOTOR_PWM_BIT_1
    } else {
        MOTOR_PWM_BIT_0
    }
}

/// Fixed-size transmit buffer for one timer group
#[derive(Debug, Clone)]
pub struct BurstBuffer {
    slots: [u32; BURST_CAPACITY],
    channel_count: usize,
}

impl BurstBuffer {
    /// Create a zeroed buffer for a timer with `channel_count` channels
    /// (including gaps)
    ///
    /// Returns `None` if the layout exceeds the reserved capacity.
    pub fn new(channel_count: usize) -> Option<Self> {
        if channel_count == 0 || channel_count > MAX_CHANNELS_PER_TIMER {
            return None;
        }

        Some(Self {
            slots: [0; BURST_CAPACITY],
            channel_count,
        })
    }

    /// Channels interleaved in this buffer
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Number of slots the DMA transfer covers
    pub fn len(&self) -> usize {
        self.channel_count * DSHOT_SLOTS_PER_MOTOR
    }

    /// Whether the active layout is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active slots, in DMA order
    pub fn as_slice(&self) -> &[u32] {
        &self.slots[..self.len()]
    }

    /// Lane for the channel at `offset` within this timer
    pub fn lane(&self, offset: usize) -> Option<Lane> {
        (offset < self.channel_count).then(|| Lane::new(self.channel_count, offset))
    }

    /// Write one frame into `lane`, MSB first
    ///
    /// Only the 16 data slots of the lane are touched. The caller must make
    /// sure no burst is currently reading the buffer.
    ///
    /// Returns `false` without writing if `lane` was laid out for a different
    /// channel count.
    pub fn write_frame(&mut self, lane: Lane, frame: u16) -> bool {
        if !self.owns(lane) {
            return false;
        }

        let mut packet = frame;

        for bit in 0..DSHOT_FRAME_BITS {
            self.slots[lane.slot(bit)] = duty_code(packet & 0x8000 != 0);
            packet <<= 1;
        }
        true
    }

    fn owns(&self, lane: Lane) -> bool {
        lane.stride == self.channel_count && lane.offset < self.channel_count
    }

    /// Read back the 16 duty codes of `lane`
    pub fn lane_codes(&self, lane: Lane) -> [u32; DSHOT_FRAME_BITS] {
        let mut codes = [0u32; DSHOT_FRAME_BITS];
        if !self.owns(lane) {
            return codes;
        }
        for (bit, code) in codes.iter_mut().enumerate() {
            *code = self.slots[lane.slot(bit)];
        }
        codes
    }
}

/// Expand a frame into the 17 duty codes of one motor
pub fn frame_duty_codes(frame: u16) -> [u32; DSHOT_SLOTS_PER_MOTOR] {
    let mut codes = [0u32; DSHOT_SLOTS_PER_MOTOR];
    for (bit, code) in codes.iter_mut().take(DSHOT_FRAME_BITS).enumerate() {
        *code = duty_code((frame >> (15 - bit)) & 1 == 1);
    }
    codes
}
