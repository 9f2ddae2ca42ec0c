//! A spinlock usable from any real OS thread standing in for a kernel-thread.
//!
//! Unlike the riscv build this is adapted from, there is no `Cpu` pointer to
//! compare against for deadlock detection: "which kernel-thread currently
//! holds interrupts disabled" is tracked per OS thread instead, via
//! [`push_off`]/[`pop_off`] thread-locals, since each process and each
//! scheduler loop here is a genuinely separate OS thread.

use std::cell::Cell;
use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    static NUM_OFF: Cell<isize> = const { Cell::new(0) };
    static INTR_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Nesting depth of [`push_off`]/[`pop_off`] on the calling thread.
pub fn num_off() -> isize {
    NUM_OFF.with(Cell::get)
}

pub fn push_off() {
    let old = INTR_ENABLED.with(Cell::get);
    NUM_OFF.with(|c| {
        if c.get() == 0 {
            INTR_ENABLED.set(old);
        }
        c.set(c.get() + 1);
    });
}

pub fn pop_off() {
    NUM_OFF.with(|c| {
        assert!(c.get() >= 1, "pop_off without matching push_off");
        c.set(c.get() - 1);
    });
}

/// RAII guard pairing `push_off`/`pop_off`, held alongside a [`SpinLockGuard`].
struct InterruptLock;

impl InterruptLock {
    fn new() -> Self {
        push_off();
        InterruptLock
    }
}

impl Drop for InterruptLock {
    fn drop(&mut self) {
        pop_off();
    }
}

/// A mutual-exclusion lock that spins instead of sleeping, for data touched
/// by the scheduler itself (where sleeping would deadlock).
pub struct SpinLock<T> {
    name: &'static str,
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinLock<T> {}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _intr: InterruptLock,
}

unsafe impl<T: Sync> Sync for SpinLockGuard<'_, T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        SpinLock {
            name,
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let _intr = InterruptLock::new();
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        SpinLockGuard { lock: self, _intr }
    }

    /// Release `guard`'s lock early, returning a handle the caller can
    /// `lock()` again later. Used by `sleep` to release a condition lock
    /// before parking and reacquire it on wakeup.
    pub fn unlock(guard: SpinLockGuard<'_, T>) -> &'_ SpinLock<T> {
        let lock: &SpinLock<T> = guard.lock;
        drop(guard);
        lock
    }

    /// Forcibly clear the lock bit without going through a guard's `Drop`.
    ///
    /// A process's first-ever dispatch resumes on a brand-new OS-thread
    /// stack that never acquired the scheduler's `inner` guard itself; that
    /// guard has no owning frame left to drop it, so the process's entry
    /// point clears the bit directly, mirroring `fork_ret`'s
    /// `release(&p->lock)`.
    ///
    /// # Safety
    /// Caller must know the lock is actually held and that no other code
    /// still references a live guard for it.
    pub unsafe fn force_unlock(&self) {
        assert!(self.locked.load(Ordering::Relaxed), "force_unlock {}", self.name);
        self.locked.store(false, Ordering::Release);
        pop_off();
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Bypass the guard entirely. Only sound when the caller can prove
    /// exclusive access some other way (e.g. during single-threaded setup).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut_unchecked(&self) -> &mut T {
        &mut *self.data.get()
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn excludes_concurrent_writers() {
        let lock = Arc::new(SpinLock::new(0u64, "counter"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    fn unlock_then_relock_roundtrip() {
        let lock = SpinLock::new(42, "x");
        let guard = lock.lock();
        let handle = SpinLock::unlock(guard);
        assert_eq!(*handle.lock(), 42);
    }
}
