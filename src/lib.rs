//! A process table and CPU scheduler core: process lifecycle (`fork`,
//! `exit`, `wait`/`waitx`, `kill`), the sleep/wakeup rendezvous, and four
//! interchangeable scheduling policies (round-robin, FCFS, priority-based,
//! and a multi-level feedback queue), all decoupled from any particular
//! instruction-set trap path or virtual-memory implementation.
//!
//! [`kernel::Kernel`] is the entry point: build one with a chosen
//! [`policy::SchedulingPolicy`], `spawn` process bodies onto it, and run
//! [`kernel::Kernel::run_scheduler`] per CPU.

#[macro_use]
pub(crate) mod error;
pub(crate) mod context;
pub(crate) mod external;
pub mod kernel;
pub mod param;
pub(crate) mod pid;
pub mod policy;
pub(crate) mod proc;
pub(crate) mod spinlock;
pub mod syscall;
pub mod sysproc;

pub use error::KernelError;
pub use kernel::{Cpu, CpuTable, Kernel, ProcessMain};
pub use pid::Pid;
pub use policy::{FcfsPolicy, MlfqPolicy, PbsPolicy, RoundRobinPolicy, SchedulingPolicy};
pub use proc::{ProcState, ProcTable};
