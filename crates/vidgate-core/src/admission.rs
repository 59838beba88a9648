//! Admission control for in-flight uploads.
//!
//! A fixed pool of slots caps how many uploads may be resident (temp file +
//! stream buffer) at once. Acquisition is strictly non-blocking: callers that
//! find the pool exhausted reject the upload immediately rather than queueing.
//! Slots replenish only on explicit release, so throughput is bounded by how
//! fast workers finish, not by a refill clock.

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct AdmissionController {
    capacity: usize,
    in_flight: AtomicUsize,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Attempt to reserve a slot. Returns `false` immediately when the pool
    /// is exhausted; never waits.
    pub fn try_acquire(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                if held < self.capacity {
                    Some(held + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Return a slot to the pool. Must be called exactly once per successful
    /// `try_acquire`, by whichever component ends that upload's lifecycle.
    pub fn release(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "admission slot released without an acquire");
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}
