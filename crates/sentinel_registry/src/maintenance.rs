//! # Rare Task Backoff
//!
//! Bulk maintenance is too expensive to run every tick. It runs when the
//! backoff counter has reached zero or when removals are already staged. A
//! pass that found work arms the counter again; otherwise the counter keeps
//! counting down.
//!
//! ```text
//! tick:     1  2  3  4  5  6  ...  12 13
//! counter:  0  10 9  8  7  6  ...  0  0
//! rare:     ✓(work)                ✓  ✓
//! ```

/// Backoff counter for the rare maintenance pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RareTaskSchedule {
    remaining: u32,
    delay: u32,
}

impl RareTaskSchedule {
    /// Schedule that waits `delay` ticks after a pass that did work.
    #[must_use]
    pub const fn new(delay: u32) -> Self {
        Self {
            remaining: 0,
            delay,
        }
    }

    /// Whether the rare pass runs this tick.
    #[must_use]
    pub const fn should_run(&self, batch_pending: bool) -> bool {
        self.remaining == 0 || batch_pending
    }

    /// Settles the counter at the end of a tick.
    pub fn finish(&mut self, did_work: bool) {
        if did_work {
            self.remaining = self.delay;
        } else {
            self.remaining = self.remaining.saturating_sub(1);
        }
    }

    /// Changes the delay used after the next pass with work.
    pub fn set_delay(&mut self, delay: u32) {
        self.delay = delay;
        self.remaining = self.remaining.min(delay);
    }

    /// Ticks left before the next unconditional pass.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Default for RareTaskSchedule {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RARE_DELAY_TICKS)
    }
}
