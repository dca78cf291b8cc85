//! Fixed-point accounting of task progress.
//!
//! Progress is accumulated over thousands of small simulation steps, so it is kept in integer units scaled by
//! [`WORK_SCALE`] rather than in floating point. Every public getter converts back to whole units by flooring the
//! scaled value, so a sub-unit leftover caused by rounding never keeps a task alive.

use serde::Serialize;

/// Number of scaled units in a single unit of work (MI for CPU, IO operations for disks).
pub const WORK_SCALE: u64 = 1_000_000;

/// Largest representable length in whole units (about 1.8e13). Longer lengths and extensions past it are capped.
pub const MAX_WORK_LENGTH: u64 = u64::MAX / WORK_SCALE;

/// Amount of work of a single task dimension (CPU or I/O) along with the progress made so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Work {
    total: u64,
    done: u64,
}

impl Work {
    /// Creates work of given length (in whole units) with no progress. Lengths above [`MAX_WORK_LENGTH`] are capped.
    pub fn new(length: u64) -> Self {
        Self {
            total: length.saturating_mul(WORK_SCALE),
            done: 0,
        }
    }

    /// Returns the total length in whole units.
    pub fn length(&self) -> u64 {
        self.total / WORK_SCALE
    }

    /// Returns the amount of work done in whole units.
    pub fn done(&self) -> u64 {
        self.done / WORK_SCALE
    }

    /// Returns the amount of work left in whole units.
    pub fn remaining(&self) -> u64 {
        (self.total - self.done) / WORK_SCALE
    }

    /// Returns `true` if no whole unit of work is left.
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Records progress of `amount` units. Negative or non-finite amounts are ignored and the progress never
    /// exceeds the total length.
    pub fn advance_by(&mut self, amount: f64) {
        if !amount.is_finite() || amount <= 0. {
            return;
        }
        // float to int conversion saturates at u64::MAX
        let delta = (amount * WORK_SCALE as f64).round() as u64;
        self.done = self.done.saturating_add(delta).min(self.total);
    }

    /// Extends the total length by `amount` units (rounded to the scaled precision), saturating at
    /// [`MAX_WORK_LENGTH`].
    pub fn extend_by(&mut self, amount: f64) {
        if !amount.is_finite() || amount <= 0. {
            return;
        }
        let delta = (amount * WORK_SCALE as f64).round() as u64;
        self.total = self.total.saturating_add(delta);
    }
}
