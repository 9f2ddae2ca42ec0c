//! Process-related system calls. Each takes the marshalled [`SyscallArgs`]
//! for one trap and returns what the dispatcher would place in the return
//! register, or a [`SysError`] to negate into it.

use std::sync::Arc;

use crate::kernel::Kernel;
use crate::pid::Pid;
use crate::syscall::{SysError, SyscallArgs};

pub fn sys_exit(kernel: &Kernel, args: &SyscallArgs) -> ! {
    let status = args.get_int(0) as i32;
    kernel.exit(args.proc.index(), status);
}

pub fn sys_getpid(args: &SyscallArgs) -> Result<i64, SysError> {
    Ok(args.proc.pid().0 as i64)
}

pub fn sys_fork(
    kernel: &Arc<Kernel>,
    args: &SyscallArgs,
    child_main: crate::kernel::ProcessMain,
) -> Result<i64, SysError> {
    let pid = kernel.fork(args.proc.index(), child_main)?;
    Ok(pid.0 as i64)
}

pub fn sys_wait(kernel: &Kernel, args: &SyscallArgs) -> Result<i64, SysError> {
    let pid = kernel.wait(args.proc.index(), args.get_out_cell(0))?;
    Ok(pid.0 as i64)
}

pub fn sys_waitx(kernel: &Kernel, args: &SyscallArgs) -> Result<i64, SysError> {
    let pid = kernel.waitx(
        args.proc.index(),
        args.get_out_cell(0),
        args.get_out_cell(1),
        args.get_out_cell(2),
    )?;
    Ok(pid.0 as i64)
}

pub fn sys_kill(kernel: &Kernel, args: &SyscallArgs) -> Result<i64, SysError> {
    let pid = Pid(args.get_int(0) as u64);
    kernel.kill(pid)?;
    Ok(0)
}

pub fn sys_set_priority(kernel: &Kernel, args: &SyscallArgs) -> Result<i64, SysError> {
    let new_priority = args.get_int(0);
    let pid = Pid(args.get_int(1) as u64);
    let previous = kernel.set_priority(args.proc.index(), pid, new_priority)?;
    Ok(previous)
}

pub fn sys_trace(kernel: &Kernel, args: &SyscallArgs) -> Result<i64, SysError> {
    let mask = args.get_int(0) as u32;
    Ok(kernel.set_trace_mask(args.proc.index(), mask) as i64)
}

pub fn sys_uptime(kernel: &Kernel) -> Result<i64, SysError> {
    Ok(kernel.ticks() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RoundRobinPolicy;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn getpid_reports_the_calling_process() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 1);
        let pid = kernel.spawn(60, Box::new(|_, _| loop {})).unwrap();
        let index = kernel.procs.slots().find(|p| p.pid() == pid).unwrap().index();
        let proc = kernel.procs.get(index);
        let args = SyscallArgs::new(proc, [0; 6]);
        assert_eq!(sys_getpid(&args).unwrap(), pid.0 as i64);
    }

    #[test]
    fn kill_rejects_an_unknown_pid() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 1);
        let pid = kernel.spawn(60, Box::new(|_, _| loop {})).unwrap();
        let index = kernel.procs.slots().find(|p| p.pid() == pid).unwrap().index();
        let proc = kernel.procs.get(index);
        let args = SyscallArgs::new(proc, [999_999, 0, 0, 0, 0, 0]);
        assert!(sys_kill(&kernel, &args).is_err());
    }

    #[test]
    fn wait_writes_the_exit_status_through_the_output_cell() {
        let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), 2);
        for i in 0..2 {
            let kernel = Arc::clone(&kernel);
            std::thread::spawn(move || kernel.run_scheduler(i));
        }

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let observed_status = Arc::new(AtomicI64::new(-1));
        let observed_status2 = Arc::clone(&observed_status);

        // sys_wait must run from the waiting process's own kernel-thread, the
        // same way a real trap handler would call it on the caller's behalf.
        kernel
            .spawn(
                60,
                Box::new(move |kernel, index| {
                    kernel.fork(index, Box::new(|kernel, idx| kernel.exit(idx, 7))).unwrap();
                    let status = AtomicI64::new(-1);
                    let proc = kernel.procs.get(index);
                    let args = SyscallArgs::with_out(proc, [0; 6], [Some(&status), None, None]);
                    loop {
                        match sys_wait(&kernel, &args) {
                            Ok(_) => break,
                            Err(_) => {
                                kernel.yield_cpu(index);
                                std::thread::sleep(std::time::Duration::from_millis(1));
                            }
                        }
                    }
                    observed_status2.store(status.load(Ordering::SeqCst), Ordering::SeqCst);
                    done2.store(true, Ordering::SeqCst);
                    kernel.exit(index, 0);
                }),
            )
            .unwrap();

        for _ in 0..200 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(observed_status.load(Ordering::SeqCst), 7);
    }
}
