//! Process identifiers.
//!
//! The riscv build this is adapted from allocates `pid` with a lock-free
//! `AtomicUsize::fetch_add`. The original C kernel this core tracks instead
//! guards `nextpid` with a dedicated spinlock (`pid_lock`), and the
//! concurrency model here keeps that lock so the documented lock-ordering
//! rule ("never acquire a process's `inner` lock while holding `pid_lock`")
//! stays a real, checkable thing rather than folklore about an atomic.

use crate::spinlock::SpinLock;

/// A process identifier. `Pid(0)` never names a live process; it marks an
/// unused process-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u64);

pub struct PidAllocator {
    next: SpinLock<u64>,
}

impl PidAllocator {
    pub const fn new() -> Self {
        PidAllocator {
            next: SpinLock::new(1, "pid_lock"),
        }
    }

    pub fn alloc(&self) -> Pid {
        let mut next = self.next.lock();
        let pid = *next;
        *next += 1;
        Pid(pid)
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
