use core::hint::spin_loop;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering;
use core::time::Duration;
use std::thread;
use std::time::Instant;

use super::BinarySemaphore;

/// Binary semaphore that busy-waits, yielding to the scheduler between polls.
#[derive(Debug)]
pub struct SpinSemaphore {
    available: AtomicBool,
}

impl BinarySemaphore for SpinSemaphore {
    fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    fn acquire(&self) {
        while !self.try_acquire() {
            spin_loop();
            thread::yield_now();
        }
    }

    fn try_acquire(&self) -> bool {
        self.available
            .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.try_acquire() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            spin_loop();
            thread::yield_now();
        }
    }

    fn release(&self) {
        self.available.store(true, Ordering::Release);
    }
}
