//! Silence timer (C3): monotonic "milliseconds since the last octet
//! observed on the wire", abstracted behind a capability trait so the FSMs
//! never read a wall clock directly.

/// A monotonic millisecond source. Implementations must never go backwards;
/// wrap behavior is irrelevant because every consumer only ever computes
/// `now - start` and compares against a few-hundred-millisecond threshold.
pub trait MonotonicClock {
    fn now_ms(&self) -> u64;
}

/// Production clock for `std` builds.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

#[cfg(feature = "std")]
impl MonotonicClock for StdClock {
    fn now_ms(&self) -> u64 {
        use std::sync::OnceLock;
        use std::time::Instant;

        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_millis() as u64
    }
}

/// Tracks the timestamp of the last observed octet and reports elapsed
/// silence. One instance per port.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilenceTimer {
    last_activity_ms: u64,
}

impl SilenceTimer {
    pub fn new(clock: &dyn MonotonicClock) -> Self {
        Self {
            last_activity_ms: clock.now_ms(),
        }
    }

    /// Milliseconds elapsed since the last reset. Never blocks.
    pub fn silence_ms(&self, clock: &dyn MonotonicClock) -> u32 {
        clock.now_ms().saturating_sub(self.last_activity_ms) as u32
    }

    /// Called whenever an octet is observed on the wire (received or sent).
    pub fn reset(&mut self, clock: &dyn MonotonicClock) {
        self.last_activity_ms = clock.now_ms();
    }
}

#[cfg(test)]
pub(crate) struct TestClock {
    now_ms: core::cell::Cell<u64>,
}

#[cfg(test)]
impl TestClock {
    pub fn new() -> Self {
        Self {
            now_ms: core::cell::Cell::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

#[cfg(test)]
impl MonotonicClock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}
