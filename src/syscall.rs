//! System-call argument marshalling.
//!
//! A real trap handler decodes `a0..a5` out of a raw trap frame; since the
//! trap path is out of scope here, [`SyscallArgs`] instead carries the
//! calling process directly plus a small fixed register file, and "user
//! pointer" output arguments (used by `wait`/`waitx`) are modeled as
//! `AtomicI64` output cells rather than raw virtual addresses, so copy-out
//! behavior is exercised without reimplementing page-table walks. Validating
//! that a real pointer actually falls in the caller's address space is a
//! virtual-memory concern this crate does not implement, which is why
//! [`SysError::BadAddress`] has no constructor here; it exists only to keep
//! the mapping from [`crate::error::KernelError`] total.

use std::sync::atomic::AtomicI64;

use crate::proc::Proc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SysError {
    NoProcess = 3,
    BadAddress = 14,
    InvalidArgument = 22,
    NoChildren = 10,
}

impl SysError {
    pub fn as_code(self) -> i64 {
        -(self as i64)
    }
}

impl From<crate::error::KernelError> for SysError {
    fn from(e: crate::error::KernelError) -> Self {
        match e {
            crate::error::KernelError::OutOfProc => SysError::NoProcess,
            crate::error::KernelError::InvalidArgument => SysError::InvalidArgument,
            crate::error::KernelError::InvalidPointer => SysError::BadAddress,
            crate::error::KernelError::NoChildren => SysError::NoChildren,
            crate::error::KernelError::Killed => SysError::NoProcess,
            crate::error::KernelError::UnknownPid => SysError::InvalidArgument,
        }
    }
}

/// Number of "user pointer" output slots a single syscall can carry —
/// `waitx` is the widest caller, with status/wait-time/cpu-time.
const MAX_OUT_CELLS: usize = 3;

/// The calling process, its raw integer argument registers, and up to three
/// output cells standing in for the "user pointer" arguments a real trap
/// frame's `a1..a3` would name.
pub struct SyscallArgs<'a> {
    pub proc: &'a Proc,
    pub args: [i64; 6],
    out: [Option<&'a AtomicI64>; MAX_OUT_CELLS],
}

impl<'a> SyscallArgs<'a> {
    pub fn new(proc: &'a Proc, args: [i64; 6]) -> Self {
        SyscallArgs {
            proc,
            args,
            out: [None; MAX_OUT_CELLS],
        }
    }

    /// Like `new`, but with output cells a caller (e.g. `wait`/`waitx`)
    /// should write its results through.
    pub fn with_out(proc: &'a Proc, args: [i64; 6], out: [Option<&'a AtomicI64>; MAX_OUT_CELLS]) -> Self {
        SyscallArgs { proc, args, out }
    }

    pub fn get_int(&self, n: usize) -> i64 {
        self.args[n]
    }

    /// The `n`th output cell this call was built with, or `None` if the
    /// caller passed none (equivalent to a syscall that discards that
    /// result).
    pub fn get_out_cell(&self, n: usize) -> Option<&'a AtomicI64> {
        self.out[n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::ProcTable;
    use std::sync::atomic::Ordering;

    #[test]
    fn reads_back_the_argument_registers_it_was_built_with() {
        let table = ProcTable::new();
        let proc = table.get(0);
        let args = SyscallArgs::new(proc, [1, 2, 3, 4, 5, 6]);
        assert_eq!(args.get_int(0), 1);
        assert_eq!(args.get_int(5), 6);
    }

    #[test]
    fn carries_output_cells_through_to_the_caller() {
        let table = ProcTable::new();
        let proc = table.get(0);
        let status = AtomicI64::new(-1);
        let args = SyscallArgs::with_out(proc, [0; 6], [Some(&status), None, None]);
        args.get_out_cell(0).unwrap().store(42, Ordering::SeqCst);
        assert_eq!(status.load(Ordering::SeqCst), 42);
        assert!(args.get_out_cell(1).is_none());
    }
}
