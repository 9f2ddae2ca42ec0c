//! Owns every piece of mutable state this core needs and every operation
//! that touches more than one process slot at a time: `fork`, `exit`,
//! `wait`/`waitx`, `kill`, `sleep`/`wakeup`, `yield_cpu`, and the per-CPU
//! scheduler loop.
//!
//! A single `Kernel` replaces the handful of file-scope statics (`PROC_TABLE`,
//! `CPUS`, the pid counter) the kernel this core is adapted from relies on,
//! per that kernel's own Design Notes on global mutable state. The one
//! remaining piece of genuinely ambient state is "which slot is running on
//! this CPU right now," tracked per-CPU in [`Cpu::current`] for introspection
//! and matching the hardware `tp`-register trick the riscv build uses to find
//! `mycpu()`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use crate::context::{swtch, Context};
use crate::error::KernelError;
use crate::external::{AddressSpace, TrapFrame};
use crate::param::{NOFILE, NPROC, PRIORITY_MAX, PRIORITY_MIN};
use crate::pid::{Pid, PidAllocator};
use crate::policy::{dynamic_priority, niceness, Accounting, ProcSnapshot, SchedulingPolicy};
use crate::proc::{Channel, ProcState, ProcTable};
use crate::spinlock::SpinLockGuard;

/// A process's first-ever dispatched body: the code a process's
/// kernel-thread runs once the scheduler releases it for the first time.
/// Real kernels land here via the trap-return path into user code; since
/// that path is out of scope here, callers (tests, `main.rs`) supply it
/// directly.
pub type ProcessMain = Box<dyn FnOnce(Arc<Kernel>, usize) + Send + 'static>;

pub struct Cpu {
    pub(crate) context: Context,
    current: StdMutex<Option<usize>>,
}

pub struct CpuTable {
    cpus: Vec<Cpu>,
}

impl CpuTable {
    fn new(n: usize) -> Self {
        assert!(n <= crate::param::NCPU, "requested more CPUs than NCPU supports");
        CpuTable {
            cpus: (0..n)
                .map(|_| Cpu {
                    context: Context::new(),
                    current: StdMutex::new(None),
                })
                .collect(),
        }
    }

    pub fn get(&self, index: usize) -> &Cpu {
        &self.cpus[index]
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// The slot index currently dispatched on `cpu_index`, if any.
    pub fn current(&self, cpu_index: usize) -> Option<usize> {
        *self.cpus[cpu_index].current.lock().unwrap()
    }
}

pub struct Kernel {
    pub(crate) procs: ProcTable,
    pid_allocator: PidAllocator,
    pub cpus: CpuTable,
    ticks: AtomicU64,
    policy: Box<dyn SchedulingPolicy>,
    init: StdMutex<Option<usize>>,
}

impl Kernel {
    pub fn new(policy: Box<dyn SchedulingPolicy>, ncpu: usize) -> Arc<Kernel> {
        Arc::new(Kernel {
            procs: ProcTable::new(),
            pid_allocator: PidAllocator::new(),
            cpus: CpuTable::new(ncpu),
            ticks: AtomicU64::new(0),
            policy,
            init: StdMutex::new(None),
        })
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn pid_of(&self, index: usize) -> Pid {
        self.procs.get(index).pid()
    }

    /// Advance the tick counter and give the current policy a chance to
    /// preempt whatever is RUNNING on `cpu_index`. Stands in for the timer
    /// interrupt this core does not implement.
    pub fn tick(&self, cpu_index: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if let Some(running) = self.cpus.current(cpu_index) {
            let proc = self.procs.get(running);
            {
                let mut inner = proc.lock_inner();
                inner.accounting.cpu_run_time += 1;
            }
            if self.policy.should_preempt_on_tick(proc, self.ticks()) {
                self.yield_cpu(running);
            }
        }
    }

    /// Create a fresh, unparented process and hand it `main` to run once
    /// dispatched. Used both for the first ("init") process and any other
    /// top-level process, since this core has no `exec` to load one.
    pub fn spawn(self: &Arc<Self>, static_priority: i64, main: ProcessMain) -> Result<Pid, KernelError> {
        let index = self.alloc(static_priority, main)?;
        let mut init = self.init.lock().unwrap();
        if init.is_none() {
            *init = Some(index);
        }
        drop(init);
        self.mark_runnable(index);
        Ok(self.procs.get(index).pid())
    }

    /// Flip a freshly set-up slot to RUNNABLE. Split out of `alloc` so every
    /// caller finishes its own setup (copying files/cwd, publishing the
    /// parent link, ...) before the scheduler can possibly see the slot.
    fn mark_runnable(&self, index: usize) {
        let mut inner = self.procs.get(index).lock_inner();
        inner.state = ProcState::Runnable;
    }

    /// Allocate a slot and spawn its kernel-thread, parked and waiting. The
    /// slot is left USED, not RUNNABLE: the caller must finish populating
    /// `ProcData`/the parent link and then call `mark_runnable` itself,
    /// since until that happens nothing else may safely read or write this
    /// slot's data through the unsynchronized `UnsafeCell`.
    fn alloc(self: &Arc<Self>, static_priority: i64, main: ProcessMain) -> Result<usize, KernelError> {
        let pid = self.pid_allocator.alloc();
        let proc = self.procs.reserve_slot().ok_or(KernelError::OutOfProc)?;
        let index = proc.index();
        {
            let mut inner = proc.lock_inner();
            inner.pid = pid;
            inner.killed = false;
            inner.xstate = 0;
            inner.running_on = None;
            inner.trace_mask = 0;
            inner.accounting = Accounting::new(self.ticks(), static_priority.clamp(PRIORITY_MIN, PRIORITY_MAX));
        }
        unsafe {
            let data = proc.data();
            data.name = [0; 16];
            data.address_space = None;
            data.trapframe = TrapFrame::default();
            data.open_files = [None; NOFILE];
            data.cwd = None;
        }

        let kernel = Arc::clone(self);
        proc.set_body(Box::new(move |idx| main(kernel, idx)));

        let spawn_kernel = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("proc-{index}"))
            .spawn(move || {
                let proc = spawn_kernel.procs.get(index);
                // Parked here until the scheduler's swtch releases us for
                // the first time.
                proc.context.park();
                // The scheduler's dispatch-time lock guard has no stack
                // frame on this thread to drop it from; release it
                // ourselves, exactly once, mirroring `fork_ret`.
                unsafe { proc.inner.force_unlock() };
                if let Some(body) = proc.take_body() {
                    body(index);
                }
                spawn_kernel.exit(index, 0);
            })
            .expect("failed to spawn a process kernel-thread");
        proc.set_thread(handle);

        log::debug!("allocated pid {} in slot {}", pid.0, index);
        Ok(index)
    }

    /// Duplicate `parent_index`'s open files, working directory, and name
    /// into a freshly allocated slot, forcing the child's trap-frame return
    /// value to 0 so a real syscall dispatcher reports `fork() == 0` to the
    /// child. The child runs `child_main` once dispatched, since this core
    /// has no register-level continuation to copy from the parent the way a
    /// real `fork` does.
    pub fn fork(self: &Arc<Self>, parent_index: usize, child_main: ProcessMain) -> Result<Pid, KernelError> {
        let parent = self.procs.get(parent_index);
        let static_priority = parent.lock_inner().accounting.static_priority;

        let child_index = self.alloc(static_priority, child_main)?;
        let child = self.procs.get(child_index);
        unsafe {
            let parent_data = parent.data();
            let child_data = child.data();
            child_data.open_files = parent_data.open_files.map(|f| f.map(|h| h.dup()));
            child_data.cwd = parent_data.cwd.map(|c| c.dup());
            child_data.name = parent_data.name;
            child_data.address_space = Some(AddressSpace::attach());
            child_data.trapframe.return_value = 0;
        }
        let child_pid = child.pid();

        {
            let mut parents = self.procs.parents.lock();
            parents[child_index] = Some(parent_index);
        }
        self.mark_runnable(child_index);
        log::debug!("pid {} forked pid {}", parent.pid().0, child_pid.0);
        Ok(child_pid)
    }

    /// Retarget every child of `original` to `init`, waking it in case it is
    /// blocked in `wait`. Called with `parents` already locked.
    fn reparent(&self, original: usize, parents: &mut [Option<usize>]) {
        let init_index = self.init.lock().unwrap().expect("reparent before any process exists");
        for slot in parents.iter_mut() {
            if *slot == Some(original) {
                *slot = Some(init_index);
            }
        }
        self.wakeup(Channel::Proc(init_index));
    }

    /// Close this process out: reparent its children to init, wake its own
    /// parent, and hand the CPU back to the scheduler one last time. Never
    /// returns; the underlying kernel-thread stays parked forever once this
    /// slot goes ZOMBIE, since no policy will ever select it again.
    pub fn exit(&self, index: usize, status: i32) -> ! {
        assert_ne!(
            *self.init.lock().unwrap(),
            Some(index),
            "the init process must never exit"
        );
        unsafe {
            let data = self.procs.get(index).data();
            data.open_files = [None; NOFILE];
            data.cwd = None;
        }

        let mut parents = self.procs.parents.lock();
        let parent_index = parents[index];
        self.reparent(index, &mut parents);
        if let Some(parent_index) = parent_index {
            self.wakeup(Channel::Proc(parent_index));
        }

        let proc = self.procs.get(index);
        let mut inner = proc.lock_inner();
        inner.xstate = status;
        inner.state = ProcState::Zombie;
        drop(parents);

        self.policy.on_dispatch_end(proc, self.ticks());
        let _inner = self.sched(index, inner);
        unreachable!("a zombie process was rescheduled");
    }

    fn reap_zombie_child(&self, index: usize) -> Result<(Pid, i32, u64, u64), KernelError> {
        let mut parents = self.procs.parents.lock();
        loop {
            let mut have_children = false;
            for i in 0..self.procs.len() {
                if parents[i] != Some(index) {
                    continue;
                }
                have_children = true;
                let child = self.procs.get(i);
                let mut inner = child.lock_inner();
                if inner.state != ProcState::Zombie {
                    continue;
                }
                let pid = inner.pid;
                let xstate = inner.xstate;
                let cpu_run_time = inner.accounting.cpu_run_time;
                let creation_time = inner.accounting.creation_time;
                inner.state = ProcState::Unused;
                inner.pid = Pid(0);
                inner.killed = false;
                inner.trace_mask = 0;
                inner.accounting = Accounting::default();
                drop(inner);
                unsafe {
                    let data = child.data();
                    data.name = [0; 16];
                    data.address_space = None;
                    data.trapframe = TrapFrame::default();
                    data.open_files = [None; NOFILE];
                    data.cwd = None;
                }
                parents[i] = None;
                return Ok((pid, xstate, cpu_run_time, creation_time));
            }

            if !have_children {
                return Err(KernelError::NoChildren);
            }
            if self.procs.get(index).lock_inner().killed {
                return Err(KernelError::Killed);
            }
            parents = self.sleep(index, Channel::Proc(index), parents);
        }
    }

    pub fn wait(&self, index: usize, out_status: Option<&AtomicI64>) -> Result<Pid, KernelError> {
        let (pid, xstate, _cpu_run_time, _creation_time) = self.reap_zombie_child(index)?;
        if let Some(cell) = out_status {
            cell.store(xstate as i64, Ordering::Relaxed);
        }
        Ok(pid)
    }

    /// Like `wait`, but also reports how long the reaped child ran on a CPU
    /// and how long it waited for one. Argument order matches the original
    /// syscall this is adapted from: status, then wait time, then CPU time.
    pub fn waitx(
        &self,
        index: usize,
        out_status: Option<&AtomicI64>,
        out_wait_time: Option<&AtomicI64>,
        out_cpu_run_time: Option<&AtomicI64>,
    ) -> Result<Pid, KernelError> {
        let (pid, xstate, cpu_run_time, creation_time) = self.reap_zombie_child(index)?;
        let wait_time = self
            .ticks()
            .saturating_sub(creation_time)
            .saturating_sub(cpu_run_time);
        if let Some(cell) = out_status {
            cell.store(xstate as i64, Ordering::Relaxed);
        }
        if let Some(cell) = out_wait_time {
            cell.store(wait_time as i64, Ordering::Relaxed);
        }
        if let Some(cell) = out_cpu_run_time {
            cell.store(cpu_run_time as i64, Ordering::Relaxed);
        }
        Ok(pid)
    }

    /// Mark `pid` killed, waking it if it is sleeping.
    pub fn kill(&self, pid: Pid) -> Result<(), KernelError> {
        if pid == Pid(0) {
            return Err(KernelError::InvalidArgument);
        }
        for proc in self.procs.slots() {
            let mut inner = proc.lock_inner();
            if inner.pid != pid {
                continue;
            }
            inner.killed = true;
            if inner.state == ProcState::Sleeping {
                inner.state = ProcState::Runnable;
            }
            return Ok(());
        }
        Err(KernelError::UnknownPid)
    }

    /// Overwrite `pid`'s static priority, returning its previous value.
    /// Zeroes the accounting counters the dynamic-priority formula reads,
    /// exactly as changing priority does in the kernel this is adapted from.
    /// Whenever the recomputed dynamic priority is strictly better than
    /// before — whether or not `pid` is the caller itself — the caller
    /// yields its own CPU immediately so the scheduler re-picks with the new
    /// priority in effect, rather than waiting for its slice to run out.
    pub fn set_priority(&self, caller_index: usize, pid: Pid, new_static_priority: i64) -> Result<i64, KernelError> {
        if pid == Pid(0) {
            return Err(KernelError::InvalidArgument);
        }
        let new_static_priority = new_static_priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        for proc in self.procs.slots() {
            let mut inner = proc.lock_inner();
            if inner.pid != pid {
                continue;
            }
            let old_static = inner.accounting.static_priority;
            let old_dp = dynamic_priority(
                old_static,
                niceness(inner.accounting.sleep_time, inner.accounting.cpu_run_time),
            );
            inner.accounting.cpu_run_time = 0;
            inner.accounting.sleep_time = 0;
            inner.accounting.static_priority = new_static_priority;
            let new_dp = dynamic_priority(new_static_priority, niceness(0, 0));
            drop(inner);

            if new_dp < old_dp {
                self.yield_cpu(caller_index);
            }
            return Ok(old_static);
        }
        Err(KernelError::UnknownPid)
    }

    /// Set the calling process's syscall-trace mask, returning the previous
    /// value. Tracing output itself belongs to the console driver, out of
    /// scope here.
    pub fn set_trace_mask(&self, index: usize, mask: u32) -> u32 {
        let mut inner = self.procs.get(index).lock_inner();
        std::mem::replace(&mut inner.trace_mask, mask)
    }

    /// A best-effort, tab-separated listing of every non-UNUSED slot: pid,
    /// state, cpu run time, wait time, and dispatch count, plus whatever
    /// extra columns the active policy contributes (PBS: current dynamic
    /// priority; MLFQ: current queue, reported -1 for a ZOMBIE slot, and the
    /// per-queue tick histogram). Each row is built under that slot's own
    /// lock, briefly, one slot at a time, the same way `run_scheduler`'s
    /// candidate scan is.
    pub fn procdump(&self) -> String {
        let mut lines = Vec::new();
        let ticks = self.ticks();
        for proc in self.procs.slots() {
            let inner = proc.lock_inner();
            if inner.state == ProcState::Unused {
                continue;
            }
            let wait_time = ticks
                .saturating_sub(inner.accounting.creation_time)
                .saturating_sub(inner.accounting.cpu_run_time);
            let mut columns = vec![
                inner.pid.0.to_string(),
                format!("{:?}", inner.state),
                inner.accounting.cpu_run_time.to_string(),
                wait_time.to_string(),
                inner.accounting.num_times_got_cpu.to_string(),
            ];
            columns.extend(self.policy.extra_dump_columns(&inner.accounting, inner.state));
            lines.push(columns.join("\t"));
        }
        lines.join("\n")
    }

    /// Release `condition`'s lock, mark the calling process SLEEPING on
    /// `chan`, and hand the CPU to the scheduler. Reacquires `condition`'s
    /// lock before returning, so the caller never observes the protected
    /// state change without holding the lock that guards it — the same
    /// lost-wakeup-safe handoff as the kernel this is adapted from: a
    /// wakeup that arrives between releasing `condition` and going to sleep
    /// can't be missed, because this process's own slot lock is held across
    /// that whole window.
    pub(crate) fn sleep<'a, T>(
        &self,
        index: usize,
        chan: Channel,
        condition: SpinLockGuard<'a, T>,
    ) -> SpinLockGuard<'a, T> {
        use crate::spinlock::SpinLock;

        let proc = self.procs.get(index);
        let mut inner = proc.lock_inner();
        let condition_lock = SpinLock::unlock(condition);

        inner.chan = Some(chan);
        inner.state = ProcState::Sleeping;
        self.policy.on_sleep_start(proc, self.ticks());

        inner = self.sched(index, inner);

        inner.chan = None;
        drop(inner);

        condition_lock.lock()
    }

    /// Wake every process sleeping on `chan`.
    pub fn wakeup(&self, chan: Channel) {
        for proc in self.procs.slots() {
            let mut inner = proc.lock_inner();
            if inner.state == ProcState::Sleeping && inner.chan == Some(chan) {
                inner.state = ProcState::Runnable;
                self.policy.on_wakeup(proc, self.ticks());
            }
        }
    }

    /// Voluntarily give up the CPU, remaining RUNNABLE.
    pub fn yield_cpu(&self, index: usize) {
        let proc = self.procs.get(index);
        let mut inner = proc.lock_inner();
        inner.state = ProcState::Runnable;
        self.policy.on_dispatch_end(proc, self.ticks());
        let _inner = self.sched(index, inner);
    }

    /// Hand the CPU this process is running on back to its scheduler loop.
    /// `inner` must already be locked with the process's state set to
    /// anything other than RUNNING; returns that same guard once the
    /// scheduler dispatches this process again.
    fn sched<'a>(&self, index: usize, inner: SpinLockGuard<'a, crate::proc::ProcInner>) -> SpinLockGuard<'a, crate::proc::ProcInner> {
        assert_eq!(crate::spinlock::num_off(), 1, "sched: locks held other than proc");
        assert_ne!(inner.state, ProcState::Running, "sched: still RUNNING");

        let cpu_index = inner.running_on.expect("sched: process was never dispatched");
        let proc = self.procs.get(index);
        unsafe { swtch(&proc.context, &self.cpus.get(cpu_index).context) };
        inner
    }

    /// The scheduler loop for one CPU. Never returns; intended to be run on
    /// its own OS thread, one per element of [`CpuTable`].
    pub fn run_scheduler(&self, cpu_index: usize) -> ! {
        loop {
            self.policy.before_select(&self.procs, self.ticks());

            let candidates: Vec<ProcSnapshot> = self
                .procs
                .slots()
                .filter_map(|proc| {
                    let inner = proc.lock_inner();
                    if inner.state == ProcState::Runnable {
                        Some(ProcSnapshot {
                            index: proc.index(),
                            pid: inner.pid,
                            accounting: inner.accounting,
                        })
                    } else {
                        None
                    }
                })
                .collect();

            let Some(chosen) = self.policy.select(&candidates) else {
                std::thread::yield_now();
                continue;
            };

            let proc = self.procs.get(chosen);
            let mut inner = proc.lock_inner();
            // Two CPUs may have picked the same slot from a stale snapshot;
            // recheck here prevents double-dispatch rather than the scan
            // itself being exclusive.
            if inner.state != ProcState::Runnable {
                continue;
            }
            inner.state = ProcState::Running;
            inner.running_on = Some(cpu_index);
            inner.accounting.num_times_got_cpu += 1;
            *self.cpus.get(cpu_index).current.lock().unwrap() = Some(chosen);

            self.policy.on_dispatch_start(proc, self.ticks());
            unsafe { swtch(&self.cpus.get(cpu_index).context, &proc.context) };
            *self.cpus.get(cpu_index).current.lock().unwrap() = None;
            // `inner` is still held here, exactly as acquired above; it is
            // only dropped now, once this process has blocked again and
            // swtch has returned control to this loop.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::WAITING_LIMIT;
    use crate::policy::{MlfqPolicy, PbsPolicy, RoundRobinPolicy};
    use crate::spinlock::SpinLock;
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;

    fn spinup(kernel: &Arc<Kernel>, n: usize) -> Vec<std::thread::JoinHandle<()>> {
        (0..n)
            .map(|i| {
                let kernel = Arc::clone(kernel);
                std::thread::spawn(move || kernel.run_scheduler(i))
            })
            .collect()
    }

    #[test]
    fn a_spawned_process_runs_to_completion_and_is_reapable() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 2);
        let _schedulers = spinup(&kernel, 2);

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let init_pid = kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    ran2.store(true, Ordering::SeqCst);
                    kernel.exit(index, 7);
                }),
            )
            .unwrap();

        let child_pid = kernel
            .fork(
                kernel.procs.slots().find(|p| p.pid() == init_pid).unwrap().index(),
                Box::new(|kernel, index| kernel.exit(index, 0)),
            )
            .unwrap();
        assert_ne!(child_pid, init_pid);

        std::thread::sleep(Duration::from_millis(50));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn fork_forces_child_return_value_to_zero() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 1);
        let _schedulers = spinup(&kernel, 1);

        let parent_pid = kernel
            .spawn(60, Box::new(|kernel, index| loop {
                kernel.yield_cpu(index);
                std::thread::sleep(Duration::from_millis(1));
            }))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let parent_index = kernel.procs.slots().find(|p| p.pid() == parent_pid).unwrap().index();

        kernel
            .fork(parent_index, Box::new(|kernel, index| kernel.exit(index, 0)))
            .unwrap();

        let child = kernel
            .procs
            .slots()
            .find(|p| p.lock_inner().pid != parent_pid && p.lock_inner().pid != Pid(0))
            .expect("child slot");
        let return_value = unsafe { child.data().trapframe.return_value };
        assert_eq!(return_value, 0);
    }

    #[test]
    fn wait_reports_exit_status_and_waitx_reports_timing() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 2);
        let _schedulers = spinup(&kernel, 2);

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let parent_pid = kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    let child_pid = kernel
                        .fork(index, Box::new(|kernel, idx| kernel.exit(idx, 42)))
                        .unwrap();
                    let status = AtomicI64::new(-1);
                    let wait_time = AtomicI64::new(-1);
                    let cpu_time = AtomicI64::new(-1);
                    let reaped = loop {
                        match kernel.waitx(index, Some(&status), Some(&wait_time), Some(&cpu_time)) {
                            Ok(pid) => break pid,
                            Err(_) => {
                                kernel.yield_cpu(index);
                            }
                        }
                    };
                    assert_eq!(reaped, child_pid);
                    assert_eq!(status.load(Ordering::SeqCst), 42);
                    assert!(wait_time.load(Ordering::SeqCst) >= 0);
                    assert!(cpu_time.load(Ordering::SeqCst) >= 0);
                    done2.store(true, Ordering::SeqCst);
                    kernel.exit(index, 0);
                }),
            )
            .unwrap();
        let _ = parent_pid;

        for _ in 0..200 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn set_priority_returns_previous_value_and_rejects_unknown_pid() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 1);
        let _schedulers = spinup(&kernel, 1);

        let pid = kernel
            .spawn(60, Box::new(|kernel, index| loop {
                kernel.yield_cpu(index);
                std::thread::sleep(Duration::from_millis(1));
            }))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let previous = kernel.set_priority(usize::MAX, pid, 10).unwrap();
        assert_eq!(previous, 60);
        assert_eq!(
            kernel.set_priority(usize::MAX, Pid(999_999), 10),
            Err(KernelError::UnknownPid)
        );
    }

    /// S2: a process that exits while its own child is still running leaves
    /// that child parentless; `exit`'s reparent pass must hand it to init,
    /// which must then be able to reap it like any other child.
    #[test]
    fn orphaned_grandchild_is_reparented_to_init_and_reapable() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 2);
        let _schedulers = spinup(&kernel, 2);

        let reaped = Arc::new(StdMutex::new(Vec::new()));
        let reaped2 = Arc::clone(&reaped);
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = Arc::clone(&done);

        let init_pid = kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    for _ in 0..2 {
                        let pid = loop {
                            match kernel.wait(index, None) {
                                Ok(pid) => break pid,
                                Err(_) => {
                                    kernel.yield_cpu(index);
                                    std::thread::sleep(Duration::from_millis(1));
                                }
                            }
                        };
                        reaped2.lock().unwrap().push(pid);
                    }
                    done2.store(true, Ordering::SeqCst);
                    loop {
                        kernel.yield_cpu(index);
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }),
            )
            .unwrap();
        let init_index = kernel.procs.slots().find(|p| p.pid() == init_pid).unwrap().index();

        let grandchild_pid = Arc::new(StdMutex::new(None));
        let grandchild_pid2 = Arc::clone(&grandchild_pid);

        kernel
            .fork(
                init_index,
                Box::new(move |kernel, mid_index| {
                    let gc_pid = kernel
                        .fork(
                            mid_index,
                            Box::new(|kernel, gc_index| {
                                std::thread::sleep(Duration::from_millis(30));
                                kernel.exit(gc_index, 9);
                            }),
                        )
                        .unwrap();
                    *grandchild_pid2.lock().unwrap() = Some(gc_pid);
                    kernel.exit(mid_index, 0);
                }),
            )
            .unwrap();

        for _ in 0..200 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(
            done.load(Ordering::SeqCst),
            "init should reap both its direct child and the reparented grandchild"
        );
        let gc_pid = grandchild_pid.lock().unwrap().unwrap();
        assert!(
            reaped.lock().unwrap().contains(&gc_pid),
            "orphaned grandchild must be reparented to init, not lost"
        );
    }

    /// S3: killing a process sleeping on some channel must wake it (rather
    /// than leaving it parked forever) and leave `killed` observable once it
    /// resumes.
    #[test]
    fn killing_a_sleeping_process_wakes_it_and_sets_killed() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 1);
        let _schedulers = spinup(&kernel, 1);

        let woke = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let woke2 = Arc::clone(&woke);
        let observed_killed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed_killed2 = Arc::clone(&observed_killed);

        let pid = kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    let condition = SpinLock::new((), "test-condition");
                    let guard = condition.lock();
                    let _guard = kernel.sleep(index, Channel::Ticks, guard);
                    woke2.store(true, Ordering::SeqCst);
                    observed_killed2.store(kernel.procs.get(index).lock_inner().killed, Ordering::SeqCst);
                    kernel.exit(index, 0);
                }),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        kernel.kill(pid).unwrap();

        for _ in 0..200 {
            if woke.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(woke.load(Ordering::SeqCst), "kill must wake a sleeping process");
        assert!(observed_killed.load(Ordering::SeqCst));
    }

    /// S5: lowering a non-current slot's priority such that its dynamic
    /// priority improves must make the *caller* yield immediately, so the
    /// reprioritized process is dispatched next rather than waiting for the
    /// caller's own slice to run out.
    #[test]
    fn lowering_a_non_current_childs_priority_makes_it_run_before_the_caller_resumes() {
        let kernel = Kernel::new(Box::new(PbsPolicy::new()), 1);
        let _schedulers = spinup(&kernel, 1);

        let order = Arc::new(StdMutex::new(Vec::new()));
        let order_child = Arc::clone(&order);
        let order_parent = Arc::clone(&order);
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = Arc::clone(&done);

        kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    let child_pid = kernel
                        .fork(
                            index,
                            Box::new(move |kernel, child_index| {
                                order_child.lock().unwrap().push("child");
                                kernel.exit(child_index, 0);
                            }),
                        )
                        .unwrap();
                    kernel.set_priority(index, child_pid, 10).unwrap();
                    order_parent.lock().unwrap().push("parent");
                    done2.store(true, Ordering::SeqCst);
                    kernel.exit(index, 0);
                }),
            )
            .unwrap();

        for _ in 0..200 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            *order.lock().unwrap(),
            vec!["child", "parent"],
            "the caller must yield so the lowered-DP child runs before the caller resumes"
        );
    }

    /// S6: MLFQ aging must actually run through the live scheduler loop
    /// (`before_select`, called every dispatch pass) and promote a
    /// long-waiting slot before the next pick, not just when a unit test
    /// calls the policy directly.
    #[test]
    fn mlfq_aging_promotes_through_the_real_scheduler_before_dispatch() {
        let kernel = Kernel::new(Box::new(MlfqPolicy::new()), 1);

        let order = Arc::new(StdMutex::new(Vec::new()));
        let order_a = Arc::clone(&order);
        let order_b = Arc::clone(&order);

        let a_pid = kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    order_a.lock().unwrap().push("a");
                    kernel.exit(index, 0);
                }),
            )
            .unwrap();
        let b_pid = kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    order_b.lock().unwrap().push("b");
                    kernel.exit(index, 0);
                }),
            )
            .unwrap();

        let a_index = kernel.procs.slots().find(|p| p.pid() == a_pid).unwrap().index();
        let b_index = kernel.procs.slots().find(|p| p.pid() == b_pid).unwrap().index();

        // Stage both slots as if they had already sunk to a lower queue, `a`
        // one level above `b`, both waiting since tick 0.
        {
            let mut a_inner = kernel.procs.get(a_index).lock_inner();
            a_inner.accounting.mlfq_queue = 1;
            a_inner.accounting.mlfq_queue_enter_tick = 0;
        }
        {
            let mut b_inner = kernel.procs.get(b_index).lock_inner();
            b_inner.accounting.mlfq_queue = 2;
            b_inner.accounting.mlfq_queue_enter_tick = 0;
        }

        // Advance past WAITING_LIMIT before any scheduler loop is running,
        // so both slots are already overdue for a promotion once one starts.
        for _ in 0..=WAITING_LIMIT {
            kernel.tick(0);
        }

        let _schedulers = spinup(&kernel, 1);

        for _ in 0..200 {
            if order.lock().unwrap().len() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            *order.lock().unwrap(),
            vec!["a", "b"],
            "aging must promote both slots one level before the first dispatch, preserving a's lead over b"
        );
    }
}
