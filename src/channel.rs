//! Single-slot rendezvous between the flushing thread and the bus worker.
//!
//! There is no queue: a second [`FlushChannel::post`] blocks until the worker
//! has moved the first message out of the slot. Completion is counted per
//! ticket so a synchronous caller can wait for exactly its own flush.

use core::hint::spin_loop;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;
use std::sync::Mutex;
use std::thread;

use log::trace;

use crate::framebuffer::SharedFrameBuffer;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::sync::lock;
use crate::sync::BinarySemaphore;
use crate::sync::Semaphore;
use crate::Error;
use crate::Result;

/// One flush request.
#[derive(Clone, Debug)]
pub struct FlushMessage {
    pub region: PixelRegion,
    pub rotation: Rotation,
    pub last_update: bool,
    pub buffer: SharedFrameBuffer,
}

/// Invoked on the worker thread once per completed flush.
pub type CompletionCallback = Box<dyn FnMut(Result<()>) + Send>;

pub struct FlushChannel<M, S = Semaphore> {
    slot: Mutex<Option<M>>,
    /// Held from `post` until the worker has moved the message out.
    message_lock: S,
    /// Released by `post` to wake the worker.
    wake: S,
    closed: AtomicBool,
    posted: AtomicU64,
    /// Messages the worker has moved out of the slot; only changes under the slot lock.
    taken: AtomicU64,
    completed: AtomicU64,
    /// Ticket and outcome of the most recent completion.
    last_result: Mutex<(u64, Result<()>)>,
    callback: Mutex<Option<CompletionCallback>>,
    has_callback: AtomicBool,
}

impl<M: Send, S: BinarySemaphore> FlushChannel<M, S> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            message_lock: S::new(true),
            wake: S::new(false),
            closed: AtomicBool::new(false),
            posted: AtomicU64::new(0),
            taken: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            last_result: Mutex::new((0, Ok(()))),
            callback: Mutex::new(None),
            has_callback: AtomicBool::new(false),
        }
    }

    /// Hands `message` to the worker, blocking while the previous one is unread.
    ///
    /// Returns the ticket of this message, usable with [`wait_done`](Self::wait_done).
    ///
    /// # Errors
    ///
    /// `Closed` once the channel has been closed, including while blocked.
    pub fn post(&self, message: M) -> Result<u64> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.message_lock.acquire();
        let mut slot = lock(&self.slot);
        if self.is_closed() {
            drop(slot);
            // pass the wake-up on to any other blocked poster
            self.message_lock.release();
            return Err(Error::Closed);
        }
        *slot = Some(message);
        let ticket = self.posted.fetch_add(1, Ordering::AcqRel) + 1;
        drop(slot);
        trace!("posted flush #{ticket}");
        self.wake.release();
        Ok(ticket)
    }

    /// Waits for the next message. `None` once the channel is closed; a
    /// message still sitting in the slot at that point is dropped untaken.
    pub fn take(&self) -> Option<M> {
        loop {
            self.wake.acquire();
            let mut slot = lock(&self.slot);
            if self.is_closed() {
                let pending = slot.take();
                drop(slot);
                drop(pending);
                self.wake.release();
                return None;
            }
            if let Some(message) = slot.take() {
                self.taken.fetch_add(1, Ordering::AcqRel);
                drop(slot);
                self.message_lock.release();
                return Some(message);
            }
        }
    }

    /// Records the outcome of the oldest outstanding message and runs the
    /// completion callback, if one is registered.
    pub fn signal_done(&self, result: Result<()>) {
        {
            let mut last = lock(&self.last_result);
            let ticket = self.completed.load(Ordering::Acquire) + 1;
            *last = (ticket, result.clone());
            self.completed.store(ticket, Ordering::Release);
            trace!("flush #{ticket} done");
        }
        if let Some(callback) = lock(&self.callback).as_mut() {
            callback(result);
        }
    }

    /// Blocks until message `ticket` has completed and returns its outcome.
    ///
    /// A result that was overwritten by a later completion reads as `Ok`.
    /// Closing the channel does not cut short a message the worker already
    /// took: that one always runs to completion.
    ///
    /// # Errors
    ///
    /// The flush's own error, or `Closed` if the channel closed before the
    /// worker took the message.
    pub fn wait_done(&self, ticket: u64) -> Result<()> {
        while self.completed.load(Ordering::Acquire) < ticket {
            if self.is_closed() && !self.was_taken(ticket) {
                return Err(Error::Closed);
            }
            spin_loop();
            thread::yield_now();
        }
        let last = lock(&self.last_result);
        if last.0 == ticket {
            last.1.clone()
        } else {
            Ok(())
        }
    }

    fn was_taken(&self, ticket: u64) -> bool {
        // after close, `take` never moves another message out under this lock
        let _slot = lock(&self.slot);
        self.taken.load(Ordering::Acquire) >= ticket
    }

    /// Completes every taken but unfinished message with `result`.
    ///
    /// For a worker that died mid-flush, so its waiters do not hang.
    pub fn abandon_taken(&self, result: Result<()>) {
        let taken = {
            let _slot = lock(&self.slot);
            self.taken.load(Ordering::Acquire)
        };
        while self.completed.load(Ordering::Acquire) < taken {
            self.signal_done(result.clone());
        }
    }

    /// True when every posted message has completed.
    pub fn is_trans_done(&self) -> bool {
        self.completed.load(Ordering::Acquire) == self.posted.load(Ordering::Acquire)
    }

    pub fn set_callback(&self, callback: Option<CompletionCallback>) {
        let mut slot = lock(&self.callback);
        self.has_callback.store(callback.is_some(), Ordering::Release);
        *slot = callback;
    }

    /// Whether flushes complete asynchronously through a callback.
    pub fn has_callback(&self) -> bool {
        self.has_callback.load(Ordering::Acquire)
    }

    /// Sets the exit event and wakes both sides.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.release();
        self.message_lock.release();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<M: Send, S: BinarySemaphore> Default for FlushChannel<M, S> {
    fn default() -> Self {
        Self::new()
    }
}
