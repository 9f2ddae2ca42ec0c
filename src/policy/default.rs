//! Round-robin: the scheduler's default policy absent any `SCHEDULER` build
//! flag. Every RUNNABLE slot gets an equal-length turn, visited in a fixed
//! rotation starting just after whichever slot ran last.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ProcSnapshot, SchedulingPolicy};
use crate::param::NPROC;

pub struct RoundRobinPolicy {
    last_dispatched: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        RoundRobinPolicy {
            last_dispatched: AtomicUsize::new(NPROC - 1),
        }
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(&self, candidates: &[ProcSnapshot]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let last = self.last_dispatched.load(Ordering::Relaxed);
        let chosen = candidates
            .iter()
            .find(|c| c.index > last)
            .or_else(|| candidates.first())?;
        self.last_dispatched.store(chosen.index, Ordering::Relaxed);
        Some(chosen.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Accounting;

    fn snap(index: usize) -> ProcSnapshot {
        ProcSnapshot {
            index,
            pid: crate::pid::Pid(index as u64 + 1),
            accounting: Accounting::new(0, 60),
        }
    }

    #[test]
    fn rotates_past_the_last_dispatched_slot() {
        let policy = RoundRobinPolicy::new();
        let candidates = vec![snap(1), snap(3), snap(5)];
        assert_eq!(policy.select(&candidates), Some(1));
        assert_eq!(policy.select(&candidates), Some(3));
        assert_eq!(policy.select(&candidates), Some(5));
        // wraps back to the lowest slot once every candidate has had a turn
        assert_eq!(policy.select(&candidates), Some(1));
    }

    #[test]
    fn empty_candidates_selects_nothing() {
        let policy = RoundRobinPolicy::new();
        assert_eq!(policy.select(&[]), None);
    }
}
