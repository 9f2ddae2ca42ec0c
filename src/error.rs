use std::fmt::Display;

/// Kernel error codes returned across the process/scheduler core's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free slot in the process table.
    OutOfProc,
    /// A step of allocation/attach failed and the slot was rolled back.
    InvalidArgument,
    /// Copy-out to a user pointer failed (the child is left ZOMBIE, reapable on retry).
    InvalidPointer,
    /// `wait`/`waitx` found no children to wait for.
    NoChildren,
    /// The calling process has been killed.
    Killed,
    /// `kill`/`set_priority` named a pid that does not exist.
    UnknownPid,
}

impl Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::OutOfProc => write!(f, "out of proc"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::InvalidPointer => write!(f, "invalid user pointer"),
            KernelError::NoChildren => write!(f, "no children"),
            KernelError::Killed => write!(f, "process killed"),
            KernelError::UnknownPid => write!(f, "unknown pid"),
        }
    }
}

impl std::error::Error for KernelError {}

/// Return an error, logging call-site location. Use instead of `return Err(...)`.
#[macro_export]
macro_rules! err {
    ($e:expr) => {{
        log::error!("errored at {}:{}: {}", file!(), line!(), $e);
        return Err($e.into());
    }};
}

/// Log an error without changing control flow.
#[macro_export]
macro_rules! log_err {
    ($e:expr) => {
        match $e {
            Ok(v) => Ok(v),
            Err(e) => {
                log::debug!("at {}:{}", file!(), line!());
                Err(e)
            }
        }
    };
}

/// Propagate an error with location logging. Use instead of bare `?`.
#[macro_export]
macro_rules! try_log {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => {
                log::debug!("at {}:{}", file!(), line!());
                return Err(e.into());
            }
        }
    };
}
