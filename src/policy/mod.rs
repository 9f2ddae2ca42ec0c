//! Scheduling policies.
//!
//! The kernel this core tracks picks one of round-robin, FCFS, PBS, or MLFQ
//! at compile time via `#ifdef`. A trait object is the idiomatic Rust
//! replacement: the scheduler loop holds one `Box<dyn SchedulingPolicy>` and
//! calls through it instead of branching on a feature flag at every
//! scheduling point.
//!
//! `select` takes an immutable snapshot slice rather than the live process
//! table so a policy's actual decision rule is unit-testable without a
//! running scheduler or any locks. Accounting updates that do need to touch
//! live, locked process state go through the other hooks instead.

mod default;
mod fcfs;
mod mlfq;
mod pbs;

pub use default::RoundRobinPolicy;
pub use fcfs::FcfsPolicy;
pub use mlfq::MlfqPolicy;
pub use pbs::PbsPolicy;

use crate::param::{MLFQ_LEVELS, PRIORITY_MAX, PRIORITY_MIN};
use crate::pid::Pid;
use crate::proc::{Proc, ProcState, ProcTable};

/// Per-process accounting a policy's decisions are made from. Mutable;
/// lives on the process itself (`crate::proc::Accounting`) and is snapshotted
/// into a [`ProcSnapshot`] for `select`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accounting {
    pub creation_time: u64,
    pub cpu_run_time: u64,
    pub sleep_time: u64,
    pub static_priority: i64,
    pub num_times_got_cpu: u64,
    pub mlfq_queue: usize,
    pub mlfq_queue_enter_tick: u64,
    pub mlfq_qticks: u64,
    /// Ticks credited to each MLFQ queue: running time plus aged waiting
    /// time, accumulated for the lifetime of the process. Display-only;
    /// nothing in `select`/`before_select` reads it back.
    pub mlfq_qtick_histogram: [u64; MLFQ_LEVELS],
    /// Tick count and queue recorded when this slot was last dispatched, so
    /// `on_dispatch_end` can credit the stint to the right histogram bucket.
    pub mlfq_dispatch_start_tick: u64,
    pub mlfq_dispatch_queue: usize,
}

impl Accounting {
    pub fn new(creation_time: u64, static_priority: i64) -> Self {
        Accounting {
            creation_time,
            static_priority,
            ..Default::default()
        }
    }
}

/// An immutable, point-in-time view of one RUNNABLE slot, built while
/// holding that slot's lock just long enough to copy out the fields below.
#[derive(Debug, Clone, Copy)]
pub struct ProcSnapshot {
    pub index: usize,
    pub pid: Pid,
    pub accounting: Accounting,
}

pub trait SchedulingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run any bookkeeping that must happen before a dispatch decision,
    /// e.g. MLFQ's aging/promotion pass. Given the whole table because aging
    /// applies even to slots that are not currently RUNNABLE.
    fn before_select(&self, _table: &ProcTable, _ticks: u64) {}

    /// Pick which, if any, of `candidates` to dispatch next. Must not
    /// acquire any lock; it only reads the snapshot it is given.
    fn select(&self, candidates: &[ProcSnapshot]) -> Option<usize>;

    /// Called once a candidate has actually been dispatched (state flipped
    /// to RUNNING, about to `swtch` into it).
    fn on_dispatch_start(&self, _proc: &Proc, _ticks: u64) {}

    /// Called when a dispatched process stops running, whether by yielding,
    /// sleeping, or exiting.
    fn on_dispatch_end(&self, _proc: &Proc, _ticks: u64) {}

    /// Called on every timer tick while `proc` is RUNNING, to decide whether
    /// it should be preempted back to RUNNABLE.
    fn should_preempt_on_tick(&self, _proc: &Proc, _ticks: u64) -> bool {
        true
    }

    fn on_sleep_start(&self, _proc: &Proc, _ticks: u64) {}

    fn on_wakeup(&self, _proc: &Proc, _ticks: u64) {}

    /// Extra `procdump` columns this policy contributes beyond the base
    /// pid/state/rtime/wtime/nrun set — PBS appends the current dynamic
    /// priority, MLFQ appends the current queue and its per-queue tick
    /// histogram. Most policies add nothing.
    fn extra_dump_columns(&self, _accounting: &Accounting, _state: ProcState) -> Vec<String> {
        Vec::new()
    }
}

/// `floor(sleepTime / (cpuRunTime + sleepTime) * 10)`, computed with the
/// integer division happening before the multiply. Since `sleepTime` is
/// never greater than the total, this truncates to 0 in every case except a
/// process that has never run (`cpuRunTime == 0`), where it comes out to 10.
/// The original course kernel this formula is taken from has this same
/// truncation; it is preserved rather than "fixed" here.
pub fn niceness(sleep_time: u64, cpu_run_time: u64) -> i64 {
    let total = cpu_run_time + sleep_time;
    if total == 0 {
        return 5;
    }
    ((sleep_time / total) * 10) as i64
}

/// `clamp(staticPriority - niceness + 5, 0, 100)`. Lower is more favored.
pub fn dynamic_priority(static_priority: i64, niceness: i64) -> i64 {
    (static_priority - niceness + 5).clamp(PRIORITY_MIN, PRIORITY_MAX)
}

fn valid_queue(queue: usize) -> usize {
    queue.min(MLFQ_LEVELS - 1)
}
