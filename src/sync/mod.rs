//! Binary semaphores used for every hand-off in the pipeline.
//!
//! Two implementations exist: one parks threads on a condition variable, the
//! other spins with `yield_now`. [`Semaphore`] names the one the crate uses;
//! the `spin-sync` feature selects the spinning variant for targets whose
//! threading layer has no usable condvar.

use core::time::Duration;
use std::sync::Mutex;
use std::sync::MutexGuard;

pub mod condvar;
pub mod spin;

/// A semaphore holding at most one permit.
pub trait BinarySemaphore: Send + Sync {
    /// Creates a semaphore, initially holding a permit if `available`.
    fn new(available: bool) -> Self
    where
        Self: Sized;

    /// Blocks until the permit can be taken.
    fn acquire(&self);

    /// Takes the permit if it is available, without blocking.
    fn try_acquire(&self) -> bool;

    /// Blocks for at most `timeout`; returns whether the permit was taken.
    fn acquire_timeout(&self, timeout: Duration) -> bool;

    /// Makes the permit available. Releasing an available permit is a no-op.
    fn release(&self);
}

/// Locks `mutex`, taking the data back from a poisoned lock.
///
/// No critical section in the crate can leave its data half-updated.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "spin-sync")] {
        pub type Semaphore = spin::SpinSemaphore;
    } else {
        pub type Semaphore = condvar::CondvarSemaphore;
    }
}
