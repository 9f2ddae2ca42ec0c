//! Kernel-thread handoff.
//!
//! The riscv build this is adapted from saves/restores callee-saved
//! registers and the stack pointer in `swtch`, written in assembly because
//! the compiler's type system has no vocabulary for "suspend this call stack
//! and resume a different one." That primitive is architecture-specific and
//! entangled with a trap/return path this crate does not implement.
//!
//! Here every process that has ever been dispatched owns a real, parked
//! `std::thread::Thread`; "suspending a stack" is literally parking the OS
//! thread that owns it, and "resuming" is waking it. `Context` is the gate
//! each kernel-thread blocks on between dispatches.

use std::sync::{Condvar, Mutex};

/// One kernel-thread's suspend/resume gate. A scheduler loop and every
/// dispatched process each own one.
pub struct Context {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Context {
    pub const fn new() -> Self {
        Context {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Mark this kernel-thread ready to run and wake it.
    pub(crate) fn unpark(&self) {
        let mut ready = self.ready.lock().unwrap();
        *ready = true;
        self.cv.notify_one();
    }

    /// Block the calling kernel-thread until some other thread calls
    /// `unpark` on this same gate.
    pub(crate) fn park(&self) {
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            ready = self.cv.wait(ready).unwrap();
        }
        *ready = false;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Suspend the calling kernel-thread's stack and resume `to`'s.
///
/// Matches the call shape `swtch(&mut cpu.context, &proc.context)`: release
/// the destination first, then wait on our own gate, so the two sides of the
/// handoff can never both be waiting.
///
/// # Safety
/// `from` must be the gate of the kernel-thread making this call; calling
/// with the wrong `from` blocks the wrong thread on resume.
pub unsafe fn swtch(from: &Context, to: &Context) {
    to.unpark();
    from.park();
}
