//! Deterministic fault injection
//!
//! Not random: a cycle length of N means every Nth completed request is
//! answered with the next entry of the error-response table instead of
//! the canned success. One injector instance is shared by all workers
//! and both pieces of state are single atomics updated by CAS, so the
//! every-Nth contract holds exactly even when workers race on it.

use crate::response::ERROR_RESPONSE_COUNT;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// What to send for one completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The canned success response.
    Deliver,
    /// The error-table entry at this index.
    Inject(usize),
}

/// Derive a fault cycle length from a requested error rate.
///
/// `rate` is clamped to [0, 1]; 0 disables injection entirely, any
/// other value yields `max(1, round(1/rate))` requests per fault.
pub fn cycle_from_rate(rate: f32) -> u32 {
    let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
    if rate == 0.0 {
        0
    } else {
        ((1.0 / rate).round() as u32).max(1)
    }
}

/// Per-request fault policy: cyclic error substitution plus a fixed
/// artificial delay.
#[derive(Debug)]
pub struct FaultInjector {
    /// Requests per injected fault; 0 disables injection.
    cycle: u32,
    /// Artificial delay applied before every response.
    delay: Duration,
    /// Completed requests since the last injected fault. Always less
    /// than `cycle` between faults; reset to 0 when a fault fires.
    counter: AtomicU32,
    /// Next error-table index. Always a valid index.
    cursor: AtomicUsize,
}

impl FaultInjector {
    pub fn new(cycle: u32, delay: Duration) -> Self {
        Self {
            cycle,
            delay,
            counter: AtomicU32::new(0),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Whether any request will ever receive an injected error.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.cycle != 0
    }

    #[inline]
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// The artificial response delay, if one is configured.
    #[inline]
    pub fn delay(&self) -> Option<Duration> {
        if self.delay.is_zero() {
            None
        } else {
            Some(self.delay)
        }
    }

    /// Completed requests since the last injected fault.
    pub fn since_last_fault(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Classify one completed request. With cycle N, calls 1..N-1 after
    /// a fault return [`Verdict::Deliver`], call N fires the next table
    /// entry and resets the count.
    pub fn decide(&self) -> Verdict {
        if self.cycle == 0 {
            return Verdict::Deliver;
        }

        let fire = loop {
            let seen = self.counter.load(Ordering::Acquire);
            let (next, fire) = if seen + 1 >= self.cycle {
                (0, true)
            } else {
                (seen + 1, false)
            };
            if self
                .counter
                .compare_exchange_weak(seen, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break fire;
            }
        };
        if !fire {
            return Verdict::Deliver;
        }

        // Advance the cursor with the wrap applied on store, keeping the
        // stored value a valid table index at all times.
        let index = loop {
            let seen = self.cursor.load(Ordering::Acquire);
            let next = (seen + 1) % ERROR_RESPONSE_COUNT;
            if self
                .cursor
                .compare_exchange_weak(seen, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break seen;
            }
        };
        Verdict::Inject(index)
    }
}
