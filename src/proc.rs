//! The process control block, its state machine, and the process table.
//!
//! Orchestration (`fork`, `exit`, `wait`, `sleep`/`wakeup`, the scheduler
//! loop) lives in [`crate::kernel`], which owns the pid allocator and the
//! parent-tracking array this module's invariants depend on. This module
//! owns the PCB shape itself and the handful of operations that only ever
//! touch one slot at a time.

use std::cell::UnsafeCell;
use std::sync::Mutex as StdMutex;
use std::thread::JoinHandle;

use crate::context::Context;
use crate::external::{AddressSpace, CwdHandle, FileHandle, KernelStackId, TrapFrame};
use crate::param::{NOFILE, NPROC};
use crate::pid::Pid;
use crate::policy::Accounting;
use crate::spinlock::{SpinLock, SpinLockGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// What a sleeping process is waiting on. Trimmed to the channels this core
/// still owns; the buffer-cache, log, and pipe channels a full kernel also
/// needs belong to subsystems out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Proc(usize),
    Ticks,
    Lock(usize),
}

/// Fields guarded by a slot's own lock: anything the scheduler, `wait`, or
/// another process's `kill`/`wakeup` needs to read or change.
pub(crate) struct ProcInner {
    pub state: ProcState,
    pub pid: Pid,
    pub chan: Option<Channel>,
    pub killed: bool,
    pub xstate: i32,
    pub accounting: Accounting,
    /// Which CPU's scheduler loop dispatched this slot, so a later `sched()`
    /// call knows which `Context` to switch back into. `None` when not
    /// RUNNING.
    pub running_on: Option<usize>,
    /// Bitmask of syscall numbers this process asked to have traced. The
    /// actual tracing output belongs to the console driver, out of scope
    /// here; this is just the mask a `trace` syscall sets.
    pub trace_mask: u32,
}

/// Fields only ever touched by the slot's own kernel-thread, or by the
/// allocator/scheduler at moments no one else can be looking (before the
/// slot is published as `Used`, or after it is `Zombie` and about to be
/// freed). Matches `proc->data` in the kernel this is adapted from, where
/// only the owning CPU ever dereferences it.
pub struct ProcData {
    pub name: [u8; 16],
    pub address_space: Option<AddressSpace>,
    pub kstack: KernelStackId,
    pub trapframe: TrapFrame,
    pub open_files: [Option<FileHandle>; NOFILE],
    pub cwd: Option<CwdHandle>,
}

/// A boxed "process body": the code this process's kernel-thread runs once
/// dispatched for the first time. In a real kernel this is wherever the
/// trap-return path lands in user code; since that path is out of scope
/// here, tests and callers supply it directly.
pub type Body = Box<dyn FnOnce(usize) + Send + 'static>;

pub struct Proc {
    index: usize,
    pub(crate) inner: SpinLock<ProcInner>,
    pub(crate) context: Context,
    data: UnsafeCell<ProcData>,
    body: StdMutex<Option<Body>>,
    thread: StdMutex<Option<JoinHandle<()>>>,
}

unsafe impl Sync for Proc {}

impl Proc {
    fn new(index: usize) -> Proc {
        Proc {
            index,
            inner: SpinLock::new(
                ProcInner {
                    state: ProcState::Unused,
                    pid: Pid(0),
                    chan: None,
                    killed: false,
                    xstate: 0,
                    accounting: Accounting::default(),
                    running_on: None,
                    trace_mask: 0,
                },
                "proc",
            ),
            context: Context::new(),
            data: UnsafeCell::new(ProcData {
                name: [0; 16],
                address_space: None,
                kstack: KernelStackId(index),
                trapframe: TrapFrame::default(),
                open_files: [None; NOFILE],
                cwd: None,
            }),
            body: StdMutex::new(None),
            thread: StdMutex::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn lock_inner(&self) -> SpinLockGuard<'_, ProcInner> {
        self.inner.lock()
    }

    pub fn pid(&self) -> Pid {
        self.inner.lock().pid
    }

    pub fn state(&self) -> ProcState {
        self.inner.lock().state
    }

    /// # Safety
    /// The caller must be the slot's own kernel-thread, or must otherwise be
    /// certain no other thread is concurrently dispatched into this slot.
    pub(crate) unsafe fn data(&self) -> &mut ProcData {
        &mut *self.data.get()
    }

    pub(crate) fn set_body(&self, body: Body) {
        *self.body.lock().unwrap() = Some(body);
    }

    pub(crate) fn take_body(&self) -> Option<Body> {
        self.body.lock().unwrap().take()
    }

    pub(crate) fn set_thread(&self, handle: JoinHandle<()>) {
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub(crate) fn has_thread(&self) -> bool {
        self.thread.lock().unwrap().is_some()
    }
}

/// The fixed-size process table plus the parent-tracking array.
///
/// `parents` is not a per-slot field: a process's parent is recorded in one
/// array, all NPROC entries guarded by a single lock, matching the
/// kernel this is adapted from, whose own comment on the equivalent
/// structure observes that combining all parent links into one
/// mutex-guarded array is simpler than a per-slot back-reference. A stale
/// `Pid` held past a slot's reuse can never match the new occupant's `Pid`
/// when `wait` or `kill` re-acquire the slot, so unlike a raw index handle
/// this needs no separate generation counter to stay safe across reuse.
pub struct ProcTable {
    slots: Vec<Proc>,
    pub(crate) parents: SpinLock<Vec<Option<usize>>>,
}

impl ProcTable {
    pub fn new() -> Self {
        ProcTable {
            slots: (0..NPROC).map(Proc::new).collect(),
            parents: SpinLock::new(vec![None; NPROC], "wait_lock"),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> &Proc {
        &self.slots[index]
    }

    pub fn slots(&self) -> impl Iterator<Item = &Proc> {
        self.slots.iter()
    }

    /// Find the first `Unused` slot and mark it `Used` under its own lock,
    /// without yet choosing a pid (the caller allocates that separately,
    /// before taking this lock, so `pid_lock` is never nested inside a
    /// slot's lock).
    pub(crate) fn reserve_slot(&self) -> Option<&Proc> {
        self.slots.iter().find(|proc| {
            let mut inner = proc.inner.lock();
            if inner.state == ProcState::Unused {
                inner.state = ProcState::Used;
                true
            } else {
                false
            }
        })
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_has_all_unused_slots() {
        let table = ProcTable::new();
        assert_eq!(table.len(), NPROC);
        for proc in table.slots() {
            assert_eq!(proc.state(), ProcState::Unused);
        }
    }

    #[test]
    fn reserve_slot_marks_used_and_is_exclusive() {
        let table = ProcTable::new();
        let reserved = table.reserve_slot().expect("a free slot");
        assert_eq!(reserved.state(), ProcState::Used);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..NPROC - 1 {
            let proc = table.reserve_slot().expect("a free slot");
            assert!(seen.insert(proc.index()));
        }
        assert!(table.reserve_slot().is_none());
    }
}
