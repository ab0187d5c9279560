//! # Period Mailbox
//!
//! Single-producer/single-consumer handoff of a batch of four periods from
//! the capture cycle to the control loop.
//!
//! ## Protocol
//!
//! - The producer writes slot `i` only while `ready` is clear, then, after
//!   the last slot, publishes the batch with a `Release` store of `ready`.
//! - The consumer observes `ready` with an `Acquire` load, copies the slots,
//!   then hands the slots back with a `Release` store clearing `ready`.
//! - The producer checks `ready` with an `Acquire` load before starting a new
//!   capture, so it never writes a slot the consumer may still be reading.
//!
//! Slot accesses themselves are `Relaxed`; ordering comes from the flag.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::dshot::protocol::TELEMETRY_MOTORS;

/// Ready flag plus one period slot per monitored motor
#[derive(Debug, Default)]
pub struct PeriodMailbox {
    ready: AtomicBool,
    periods: [AtomicU32; TELEMETRY_MOTORS],
}

impl PeriodMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a complete batch is waiting for the consumer
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Store one period (producer side)
    ///
    /// Must only be called while no batch is pending.
    pub fn store(&self, motor: usize, period: u32) {
        debug_assert!(!self.ready.load(Ordering::Relaxed), "slot written while batch pending");
        if let Some(slot) = self.periods.get(motor) {
            slot.store(period, Ordering::Relaxed);
        }
    }

    /// Publish the batch written so far (producer side)
    pub fn publish(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Copy out a ready batch and release the slots (consumer side)
    ///
    /// # Arguments
    ///
    /// * `out` - Destination, must hold exactly four periods
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if a batch was copied; `false` leaves all state untouched
    pub fn drain(&self, out: &mut [u32]) -> bool {
        if out.len() != TELEMETRY_MOTORS {
            return false;
        }

        if !self.ready.load(Ordering::Acquire) {
            return false;
        }

        for (dst, slot) in out.iter_mut().zip(self.periods.iter()) {
            *dst = slot.load(Ordering::Relaxed);
        }

        self.ready.store(false, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_mailbox_not_ready() {
        let mailbox = PeriodMailbox::new();
        let mut out = [7u32; 4];
        assert!(!mailbox.is_ready());
        assert!(!mailbox.drain(&mut out));
        assert_eq!(out, [7; 4]);
    }

    #[test]
    fn test_publish_then_drain_once() {
        let mailbox = PeriodMailbox::new();
        for (motor, period) in [100u32, 200, 300, 400].into_iter().enumerate() {
            mailbox.store(motor, period);
        }
        mailbox.publish();

        let mut out = [0u32; 4];
        assert!(mailbox.drain(&mut out));
        assert_eq!(out, [100, 200, 300, 400]);
        assert!(!mailbox.drain(&mut out));
    }

    #[test]
    fn test_wrong_length_leaves_batch() {
        let mailbox = PeriodMailbox::new();
        mailbox.store(0, 1);
        mailbox.publish();

        let mut short = [0u32; 3];
        let mut long = [0u32; 5];
        assert!(!mailbox.drain(&mut short));
        assert!(!mailbox.drain(&mut long));
        assert_eq!(short, [0; 3]);
        assert!(mailbox.is_ready());

        let mut out = [0u32; 4];
        assert!(mailbox.drain(&mut out));
        assert_eq!(out[0], 1);
    }

    #[test]
    fn test_store_ignores_unknown_motor() {
        let mailbox = PeriodMailbox::new();
        mailbox.store(9, 123);
        mailbox.publish();

        let mut out = [1u32; 4];
        assert!(mailbox.drain(&mut out));
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_consumer_on_other_thread_sees_whole_batch() {
        let mailbox = Arc::new(PeriodMailbox::new());
        let consumer = Arc::clone(&mailbox);

        let handle = thread::spawn(move || {
            let mut batches = Vec::new();
            let mut out = [0u32; 4];
            while batches.len() < 50 {
                if consumer.drain(&mut out) {
                    batches.push(out);
                }
                thread::yield_now();
            }
            batches
        });

        let mut round = 0u32;
        while round < 50 {
            if mailbox.is_ready() {
                thread::yield_now();
                continue;
            }
            for motor in 0..4 {
                mailbox.store(motor, round * 10 + motor as u32);
            }
            mailbox.publish();
            round += 1;
        }

        let batches = handle.join().unwrap();
        for (round, batch) in batches.iter().enumerate() {
            let base = round as u32 * 10;
            assert_eq!(*batch, [base, base + 1, base + 2, base + 3]);
        }
    }
}
