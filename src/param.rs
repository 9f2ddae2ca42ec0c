//! Compile-time configuration. A teaching kernel has no dynamic configuration
//! layer; every tunable here is a `const`, exactly as the upstream kernel
//! this core is adapted from does it.

/// maximum number of CPUs (scheduler kernel-threads)
pub const NCPU: usize = 8;
/// maximum number of processes
pub const NPROC: usize = 64;
/// open files per process
pub const NOFILE: usize = 16;

/// PBS: default static priority assigned to a freshly allocated process.
pub const DEFAULT_STATIC_PRIORITY: i64 = 60;
/// PBS: clamp bounds for both static and dynamic priority.
pub const PRIORITY_MIN: i64 = 0;
pub const PRIORITY_MAX: i64 = 100;

/// MLFQ: number of priority queues, 0 (highest) .. MLFQ_LEVELS - 1 (lowest).
pub const MLFQ_LEVELS: usize = 5;
/// MLFQ: ticks a RUNNABLE slot may wait in its current queue before being
/// promoted one level. Implementation-defined per spec; chosen to match the
/// conventional xv6-pbs/mlfq course assignment value.
pub const WAITING_LIMIT: u64 = 30;
/// MLFQ: time slice length (in ticks) granted to a process dispatched from
/// each queue. Index 0 is the highest-priority, shortest-slice queue.
pub const MLFQ_TIME_SLICES: [u64; MLFQ_LEVELS] = [1, 2, 4, 8, 16];
