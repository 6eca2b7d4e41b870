//! The pipeline's two internal frame buffers.
//!
//! One buffer is *active*: it holds the frame last sent to the panel. The
//! other is *idle* and is where the next flush is transformed. A successful
//! transmission swaps the roles, so a rotated partial update never writes into
//! memory the backend may still be reading.

use std::sync::Arc;

use log::trace;

use super::FrameBuffer;
use super::MemoryCaps;
use super::SharedFrameBuffer;
use crate::Error;
use crate::Result;

/// Lifecycle of one internal buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    /// Free to be transformed into.
    Idle,
    /// The transform is writing into it.
    Transforming,
    /// Handed to the backend, transfer not yet complete.
    InFlight,
    /// Holds the frame the panel currently shows.
    Active,
}

#[derive(Debug)]
pub struct FrameBufferSet {
    buffers: [SharedFrameBuffer; 2],
    states: [BufferState; 2],
    active: usize,
}

impl FrameBufferSet {
    /// Allocates both buffers with `size` bytes each.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if either allocation fails; nothing is kept in that case.
    pub fn alloc(size: usize, caps: MemoryCaps) -> Result<Self> {
        let first = FrameBuffer::alloc(size, caps)?;
        let second = FrameBuffer::alloc(size, caps)?;
        trace!("allocated frame buffer pair of {size} bytes ({caps:?})");
        Ok(Self {
            buffers: [first.into_shared(), second.into_shared()],
            states: [BufferState::Active, BufferState::Idle],
            active: 0,
        })
    }

    fn idle_index(&self) -> usize {
        self.active ^ 1
    }

    pub fn buffer_len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn caps(&self) -> MemoryCaps {
        self.buffers[0].caps()
    }

    pub fn active(&self) -> &SharedFrameBuffer {
        &self.buffers[self.active]
    }

    pub fn idle(&self) -> &SharedFrameBuffer {
        &self.buffers[self.idle_index()]
    }

    pub fn active_state(&self) -> BufferState {
        self.states[self.active]
    }

    pub fn idle_state(&self) -> BufferState {
        self.states[self.idle_index()]
    }

    /// Claims the idle buffer for writing.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the idle buffer is not `Idle` or a backend still
    /// holds a reference to it.
    pub fn begin_transform(&mut self) -> Result<&mut FrameBuffer> {
        let idle = self.idle_index();
        if self.states[idle] != BufferState::Idle {
            return Err(Error::InvalidState);
        }
        let buffer = Arc::get_mut(&mut self.buffers[idle]).ok_or(Error::InvalidState)?;
        self.states[idle] = BufferState::Transforming;
        Ok(buffer)
    }

    /// Releases the idle buffer after the transform, leaving it `Idle`.
    pub fn end_transform(&mut self) -> Result<()> {
        let idle = self.idle_index();
        if self.states[idle] != BufferState::Transforming {
            return Err(Error::InvalidState);
        }
        self.states[idle] = BufferState::Idle;
        Ok(())
    }

    /// Marks the idle buffer in flight and returns a handle for the backend.
    pub fn begin_tx(&mut self) -> Result<SharedFrameBuffer> {
        let idle = self.idle_index();
        if self.states[idle] != BufferState::Idle {
            return Err(Error::InvalidState);
        }
        self.states[idle] = BufferState::InFlight;
        Ok(Arc::clone(&self.buffers[idle]))
    }

    /// Ends the transfer started by [`begin_tx`](Self::begin_tx).
    ///
    /// On success the in-flight buffer becomes active and the previously
    /// active one idle. On failure the roles are kept and the in-flight buffer
    /// returns to `Idle`.
    pub fn finish_tx(&mut self, transmitted: bool) -> Result<()> {
        let idle = self.idle_index();
        if self.states[idle] != BufferState::InFlight {
            return Err(Error::InvalidState);
        }
        if transmitted {
            self.states[self.active] = BufferState::Idle;
            self.states[idle] = BufferState::Active;
            self.active = idle;
        } else {
            self.states[idle] = BufferState::Idle;
        }
        Ok(())
    }

    /// Copies the active frame into the idle buffer.
    ///
    /// Used by full-frame backends so the next partial update lands on top of
    /// what is already on the panel.
    pub fn copy_forward(&mut self) -> Result<()> {
        let idle = self.idle_index();
        if self.states[idle] != BufferState::Idle {
            return Err(Error::InvalidState);
        }
        let [first, second] = &mut self.buffers;
        let (src, dst) = if self.active == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        };
        let dst = Arc::get_mut(dst).ok_or(Error::InvalidState)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> FrameBufferSet {
        FrameBufferSet::alloc(8, MemoryCaps::DMA).unwrap()
    }

    #[test]
    fn test_initial_roles() {
        let set = set();
        assert_eq!(set.active_state(), BufferState::Active);
        assert_eq!(set.idle_state(), BufferState::Idle);
        assert_eq!(set.buffer_len(), 8);
        assert!(set.caps().dma());
        assert!(!Arc::ptr_eq(set.active(), set.idle()));
    }

    #[test]
    fn test_successful_tx_swaps() {
        let mut set = set();
        let before_active = Arc::as_ptr(set.active());
        let before_idle = Arc::as_ptr(set.idle());

        set.begin_transform().unwrap().fill(0xAA);
        set.end_transform().unwrap();
        let in_flight = set.begin_tx().unwrap();
        assert_eq!(Arc::as_ptr(&in_flight), before_idle);
        assert_eq!(set.idle_state(), BufferState::InFlight);
        drop(in_flight);
        set.finish_tx(true).unwrap();

        assert_eq!(Arc::as_ptr(set.active()), before_idle);
        assert_eq!(Arc::as_ptr(set.idle()), before_active);
        assert_eq!(set.active_state(), BufferState::Active);
        assert_eq!(set.idle_state(), BufferState::Idle);
        assert!(set.active().iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_failed_tx_keeps_roles() {
        let mut set = set();
        let active = Arc::as_ptr(set.active());
        set.begin_transform().unwrap();
        set.end_transform().unwrap();
        drop(set.begin_tx().unwrap());
        set.finish_tx(false).unwrap();
        assert_eq!(Arc::as_ptr(set.active()), active);
        assert_eq!(set.idle_state(), BufferState::Idle);
    }

    #[test]
    fn test_out_of_order_calls() {
        let mut set = set();
        assert_eq!(set.end_transform().unwrap_err(), Error::InvalidState);
        assert_eq!(set.finish_tx(true).unwrap_err(), Error::InvalidState);
        set.begin_transform().unwrap();
        assert_eq!(set.begin_transform().unwrap_err(), Error::InvalidState);
        assert_eq!(set.begin_tx().unwrap_err(), Error::InvalidState);
    }

    #[test]
    fn test_transform_refused_while_backend_holds_buffer() {
        let mut set = set();
        let held = Arc::clone(set.idle());
        assert_eq!(set.begin_transform().unwrap_err(), Error::InvalidState);
        assert_eq!(set.idle_state(), BufferState::Idle);
        drop(held);
        assert!(set.begin_transform().is_ok());
    }

    #[test]
    fn test_copy_forward() {
        let mut set = set();
        set.begin_transform().unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        set.end_transform().unwrap();
        drop(set.begin_tx().unwrap());
        set.finish_tx(true).unwrap();

        set.copy_forward().unwrap();
        assert_eq!(&set.idle()[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!Arc::ptr_eq(set.active(), set.idle()));
    }
}
