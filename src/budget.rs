//! Soft wall-clock time budget and cooperative cancellation for the loop generator.
//! Checked between radial explorations, between return-path searches, and after the
//! overlap filter. Never mid-mutation of the graph, which stays untouched either way.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    Running,
    Drain,
}

/// Tracks elapsed time against a configured budget and exposes a cheap check that the
/// generator calls at its defined checkpoints.
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
    state: BudgetState,
}

impl TimeBudget {
    pub fn start(limit: Duration) -> Self {
        TimeBudget {
            started: Instant::now(),
            limit,
            state: BudgetState::Running,
        }
    }

    /// Call at a checkpoint. Once the limit is exceeded, latches into `Drain` and
    /// stays there even if somehow called again after the clock ticks back under
    /// (it never does, but the latch keeps the transition monotonic).
    pub fn check(&mut self) -> BudgetState {
        if self.state == BudgetState::Drain {
            return self.state;
        }
        if self.started.elapsed() >= self.limit {
            self.state = BudgetState::Drain;
        }
        self.state
    }

    pub fn is_draining(&self) -> bool {
        self.state == BudgetState::Drain
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stays_running_within_budget() {
        let mut b = TimeBudget::start(Duration::from_secs(3));
        assert_eq!(b.check(), BudgetState::Running);
    }

    #[test]
    fn drains_after_limit() {
        let mut b = TimeBudget::start(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(b.check(), BudgetState::Drain);
        assert!(b.is_draining());
    }
}
