use core::time::Duration;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Instant;

use super::BinarySemaphore;

/// Binary semaphore parking waiters on a [`Condvar`].
#[derive(Debug)]
pub struct CondvarSemaphore {
    available: Mutex<bool>,
    cond: Condvar,
}

impl CondvarSemaphore {
    // a panicking holder cannot leave the flag half-written
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.available
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl BinarySemaphore for CondvarSemaphore {
    fn new(available: bool) -> Self {
        Self {
            available: Mutex::new(available),
            cond: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let guard = self.lock();
        let mut guard = self
            .cond
            .wait_while(guard, |available| !*available)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = false;
    }

    fn try_acquire(&self) -> bool {
        let mut guard = self.lock();
        core::mem::replace(&mut *guard, false)
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        while !*guard {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .cond
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
        }
        *guard = false;
        true
    }

    fn release(&self) {
        *self.lock() = true;
        self.cond.notify_one();
    }
}
