//! Priority-based scheduling. Every RUNNABLE slot has a static priority
//! (set at creation, adjustable via `set_priority`) and a dynamic priority
//! derived from it and how much the process has slept versus run:
//! `DP = clamp(staticPriority - niceness(sleepTime, cpuRunTime) + 5, 0, 100)`.
//! Lower DP wins; ties break on fewer prior dispatches, then earlier
//! creation.

use super::{dynamic_priority, niceness, Accounting, ProcSnapshot, SchedulingPolicy};
use crate::proc::ProcState;

pub struct PbsPolicy;

impl PbsPolicy {
    pub fn new() -> Self {
        PbsPolicy
    }
}

impl Default for PbsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for PbsPolicy {
    fn name(&self) -> &'static str {
        "pbs"
    }

    fn select(&self, candidates: &[ProcSnapshot]) -> Option<usize> {
        candidates
            .iter()
            .min_by_key(|c| {
                let dp = dynamic_priority(
                    c.accounting.static_priority,
                    niceness(c.accounting.sleep_time, c.accounting.cpu_run_time),
                );
                (dp, c.accounting.num_times_got_cpu, c.accounting.creation_time)
            })
            .map(|c| c.index)
    }

    fn extra_dump_columns(&self, accounting: &Accounting, _state: ProcState) -> Vec<String> {
        let dp = dynamic_priority(
            accounting.static_priority,
            niceness(accounting.sleep_time, accounting.cpu_run_time),
        );
        vec![dp.to_string()]
    }
}
