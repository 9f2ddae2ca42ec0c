//! Demo binary: boots a kernel with the default round-robin policy across a
//! handful of CPUs, spawns an `init` process that forks a few children, and
//! lets the scheduler run them to completion.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kernel::param::DEFAULT_STATIC_PRIORITY;
use kernel::{Kernel, RoundRobinPolicy};

const CPUS: usize = 2;
const CHILDREN: usize = 3;

fn main() {
    let kernel = Kernel::new(Box::new(RoundRobinPolicy::new()), CPUS);

    for cpu in 0..CPUS {
        let kernel = Arc::clone(&kernel);
        thread::spawn(move || kernel.run_scheduler(cpu));
    }

    kernel
        .spawn(DEFAULT_STATIC_PRIORITY, Box::new(init_body))
        .expect("process table has room for init");

    thread::sleep(Duration::from_millis(500));
    println!("ticks elapsed: {}", kernel.ticks());
}

fn init_body(kernel: Arc<Kernel>, index: usize) {
    for n in 0..CHILDREN {
        kernel
            .fork(
                index,
                Box::new(move |kernel, child_index| {
                    println!("child {n} (pid {:?}) running", kernel.pid_of(child_index));
                    kernel.exit(child_index, n as i32);
                }),
            )
            .expect("fork should find a free slot");
    }

    for _ in 0..CHILDREN {
        match kernel.wait(index, None) {
            Ok(pid) => println!("init reaped {pid:?}"),
            Err(e) => {
                println!("wait failed: {e}");
                break;
            }
        }
    }

    kernel.exit(index, 0);
}
