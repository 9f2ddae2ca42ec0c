//! First-come-first-served: non-preemptive, always dispatches whichever
//! RUNNABLE slot has the earliest `creation_time`. The scan that finds it
//! is documented as racy in the system this is adapted from (two CPUs may
//! both pick the same slot); this crate makes that scan sound by taking each
//! slot's lock briefly while building the snapshot, then still rechecking
//! RUNNABLE once more right before dispatch, which preserves the original's
//! "double-dispatch is prevented by the recheck, not by the scan" behavior.

use super::{ProcSnapshot, SchedulingPolicy};
use crate::proc::Proc;

pub struct FcfsPolicy;

impl FcfsPolicy {
    pub fn new() -> Self {
        FcfsPolicy
    }
}

impl Default for FcfsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for FcfsPolicy {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn select(&self, candidates: &[ProcSnapshot]) -> Option<usize> {
        candidates
            .iter()
            .min_by_key(|c| (c.accounting.creation_time, c.index))
            .map(|c| c.index)
    }

    /// FCFS is non-preemptive: once dispatched, a process keeps the CPU
    /// until it yields the CPU on its own (sleep, exit, or `yield`).
    fn should_preempt_on_tick(&self, _proc: &Proc, _ticks: u64) -> bool {
        false
    }
}
