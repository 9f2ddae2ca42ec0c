//! Multi-level feedback queue. `MLFQ_LEVELS` queues, numbered 0 (highest
//! priority, shortest time slice) through the lowest. A process starts in
//! queue 0; exhausting its slice while RUNNING demotes it one level, and
//! waiting RUNNABLE in the same queue longer than `WAITING_LIMIT` ticks
//! promotes it one level, so a compute-bound process sinks to the bottom
//! while one that keeps sleeping stays near the top.

use super::{valid_queue, Accounting, ProcSnapshot, SchedulingPolicy};
use crate::param::{MLFQ_TIME_SLICES, WAITING_LIMIT};
use crate::proc::{Proc, ProcState, ProcTable};

pub struct MlfqPolicy;

impl MlfqPolicy {
    pub fn new() -> Self {
        MlfqPolicy
    }
}

impl Default for MlfqPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for MlfqPolicy {
    fn name(&self) -> &'static str {
        "mlfq"
    }

    fn before_select(&self, table: &ProcTable, ticks: u64) {
        for proc in table.slots() {
            let mut inner = proc.lock_inner();
            if inner.state != ProcState::Runnable {
                continue;
            }
            let acc = &mut inner.accounting;
            if acc.mlfq_queue > 0 && ticks.saturating_sub(acc.mlfq_queue_enter_tick) > WAITING_LIMIT {
                let old_queue = valid_queue(acc.mlfq_queue);
                acc.mlfq_qtick_histogram[old_queue] += ticks.saturating_sub(acc.mlfq_queue_enter_tick);
                acc.mlfq_queue -= 1;
                acc.mlfq_queue_enter_tick = ticks;
                acc.mlfq_qticks = 0;
            }
        }
    }

    fn select(&self, candidates: &[ProcSnapshot]) -> Option<usize> {
        candidates
            .iter()
            .min_by_key(|c| (c.accounting.mlfq_queue, c.accounting.mlfq_queue_enter_tick, c.index))
            .map(|c| c.index)
    }

    fn on_dispatch_start(&self, proc: &Proc, ticks: u64) {
        let mut inner = proc.lock_inner();
        inner.accounting.mlfq_dispatch_start_tick = ticks;
        inner.accounting.mlfq_dispatch_queue = valid_queue(inner.accounting.mlfq_queue);
    }

    fn on_dispatch_end(&self, proc: &Proc, ticks: u64) {
        let mut inner = proc.lock_inner();
        let acc = &mut inner.accounting;
        let queue = acc.mlfq_dispatch_queue;
        acc.mlfq_qtick_histogram[queue] += ticks.saturating_sub(acc.mlfq_dispatch_start_tick);
        acc.mlfq_queue_enter_tick = ticks;
    }

    fn should_preempt_on_tick(&self, proc: &Proc, _ticks: u64) -> bool {
        let mut inner = proc.lock_inner();
        let queue = valid_queue(inner.accounting.mlfq_queue);
        inner.accounting.mlfq_qticks += 1;
        if inner.accounting.mlfq_qticks >= MLFQ_TIME_SLICES[queue] {
            inner.accounting.mlfq_queue = queue + 1;
            if inner.accounting.mlfq_queue >= MLFQ_TIME_SLICES.len() {
                inner.accounting.mlfq_queue = MLFQ_TIME_SLICES.len() - 1;
            }
            inner.accounting.mlfq_qticks = 0;
            true
        } else {
            false
        }
    }

    fn extra_dump_columns(&self, accounting: &Accounting, state: ProcState) -> Vec<String> {
        let queue: i64 = if state == ProcState::Zombie {
            -1
        } else {
            accounting.mlfq_queue as i64
        };
        let mut cols = vec![queue.to_string()];
        cols.extend(accounting.mlfq_qtick_histogram.iter().map(|t| t.to_string()));
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::Pid;
    use crate::policy::Accounting;

    fn snap(index: usize, queue: usize, enter_tick: u64) -> ProcSnapshot {
        ProcSnapshot {
            index,
            pid: Pid(index as u64 + 1),
            accounting: Accounting {
                mlfq_queue: queue,
                mlfq_queue_enter_tick: enter_tick,
                ..Accounting::default()
            },
        }
    }

    #[test]
    fn prefers_higher_priority_queue() {
        let policy = MlfqPolicy::new();
        let candidates = vec![snap(0, 2, 0), snap(1, 0, 5)];
        assert_eq!(policy.select(&candidates), Some(1));
    }

    #[test]
    fn within_a_queue_earliest_entrant_wins() {
        let policy = MlfqPolicy::new();
        let candidates = vec![snap(0, 1, 20), snap(1, 1, 5)];
        assert_eq!(policy.select(&candidates), Some(1));
    }

    #[test]
    fn aging_promotes_strictly_after_the_waiting_limit_not_at_it() {
        let table = ProcTable::new();
        let proc = table.reserve_slot().expect("a free slot");
        let index = proc.index();
        {
            let mut inner = proc.lock_inner();
            inner.state = ProcState::Runnable;
            inner.accounting.mlfq_queue = 2;
            inner.accounting.mlfq_queue_enter_tick = 0;
        }
        let policy = MlfqPolicy::new();

        policy.before_select(&table, WAITING_LIMIT);
        assert_eq!(
            table.get(index).lock_inner().accounting.mlfq_queue,
            2,
            "waiting exactly WAITING_LIMIT ticks must not promote yet"
        );

        policy.before_select(&table, WAITING_LIMIT + 1);
        let inner = table.get(index).lock_inner();
        assert_eq!(inner.accounting.mlfq_queue, 1, "waiting past WAITING_LIMIT must promote");
        assert_eq!(inner.accounting.mlfq_qtick_histogram[2], WAITING_LIMIT + 1);
    }
}
