use std::thread;

use crossbeam::utils::Backoff;

use crate::options::BagOptions;

/// Bounded spin-then-yield waiting primitive.
///
/// The first `spin_limit` steps busy-wait with exponential backoff, every step
/// after that yields the time slice to the scheduler. The waiter never parks,
/// so a wait only lasts as long as the operation it is waiting for.
///
pub struct SpinWait {
    backoff: Backoff,
    spin_limit: u32,
    steps: u32,
}

impl SpinWait {
    pub fn new() -> Self {
        Self::with_spin_limit(BagOptions::DEFAULT_SPIN_LIMIT)
    }

    pub fn with_spin_limit(spin_limit: u32) -> Self {
        SpinWait {
            backoff: Backoff::new(),
            spin_limit,
            steps: 0,
        }
    }

    /// Number of steps performed so far.
    ///
    pub fn count(&self) -> u32 {
        self.steps
    }

    /// Returns true once the next step is going to yield instead of spin.
    ///
    pub fn will_yield(&self) -> bool {
        self.steps >= self.spin_limit
    }

    pub fn spin_once(&mut self) {
        if self.will_yield() {
            thread::yield_now();
        } else {
            self.backoff.spin();
        }
        self.steps = self.steps.saturating_add(1);
    }

    /// Waits until `condition` returns true.
    ///
    pub fn spin_until<F>(&mut self, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        while !condition() {
            self.spin_once();
        }
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
        self.steps = 0;
    }
}

impl Default for SpinWait {
    fn default() -> Self {
        Self::new()
    }
}
