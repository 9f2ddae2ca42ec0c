//! Stand-ins for subsystems this crate references but does not implement:
//! virtual memory, the trap frame, the kernel-stack region, and open files.
//! None of these perform real I/O, paging, or allocation; they exist so the
//! process control block's shape and its fork/exit invariants stay real and
//! testable without this crate owning VM, FS, or trap logic.

/// Opaque handle a real virtual memory subsystem would attach to a process.
#[derive(Debug, Default)]
pub struct AddressSpace {
    attached: bool,
}

impl AddressSpace {
    pub fn attach() -> Self {
        AddressSpace { attached: true }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

/// The slice of a real trap frame this core's invariants depend on: a
/// child's `fork` return value must come back as 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub return_value: i64,
}

/// A process's index into a statically pre-mapped kernel-stack region.
/// Immutable after boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStackId(pub usize);

/// Reference-counted-by-convention handle to an open file. `dup` is a cheap
/// clone, matching a real file table's refcount bump on `fork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(pub u32);

impl FileHandle {
    pub fn dup(&self) -> FileHandle {
        *self
    }
}

/// Reference-counted-by-convention handle to a process's current directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwdHandle(pub u32);

impl CwdHandle {
    pub fn dup(&self) -> CwdHandle {
        *self
    }
}
