//! Millisecond time sources for the controller's sample cadence.

use core::cell::Cell;

/// A monotonic millisecond counter.
///
/// Only differences between readings matter; the counter may start anywhere
/// and is allowed to wrap.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// Clock that only moves when told to. Used for host simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}

/// Milliseconds from `earlier` to `now`, tolerating counter wrap.
#[inline]
pub(crate) fn elapsed_millis(now: u64, earlier: u64) -> u64 {
    now.wrapping_sub(earlier)
}
