//! Frame buffers and their allocation capabilities.
//!
//! Buffers travel between the renderer, the pipeline and the backends as
//! [`SharedFrameBuffer`]s. Writing needs exclusive access (`Arc::get_mut`),
//! so a buffer that is still queued or in flight simply cannot be written.

use core::ops::BitOr;
use core::ops::Deref;
use core::ops::DerefMut;
use std::sync::Arc;
use std::sync::Mutex;

use bitfield::bitfield;

use crate::region::RotationData;
use crate::sync::lock;
use crate::transform::transform;
use crate::Error;
use crate::Result;

pub mod canvas;
pub mod set;

pub use canvas::Canvas;
pub use set::BufferState;
pub use set::FrameBufferSet;

bitfield! {
    /// Heap capability bits, numbered like the ESP-IDF `MALLOC_CAP_*` flags.
    #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct MemoryCaps(u32);
    impl Debug;
    pub exec, set_exec: 0;
    pub bits32, set_bits32: 1;
    pub bits8, set_bits8: 2;
    pub dma, set_dma: 3;
    pub spiram, set_spiram: 10;
    pub internal, set_internal: 11;
    pub default_heap, set_default_heap: 12;
}

impl MemoryCaps {
    pub const NONE: Self = Self(0);
    pub const EXEC: Self = Self(1 << 0);
    pub const BITS32: Self = Self(1 << 1);
    pub const BITS8: Self = Self(1 << 2);
    pub const DMA: Self = Self(1 << 3);
    pub const SPIRAM: Self = Self(1 << 10);
    pub const INTERNAL: Self = Self(1 << 11);
    pub const DEFAULT: Self = Self(1 << 12);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True when every capability in `required` is present.
    pub const fn satisfies(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for MemoryCaps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MemoryCaps {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "MemoryCaps({=u32:#x})", self.0)
    }
}

/// Buffers one bus hands out to callers at a time.
pub(crate) const MAX_SLOTS: usize = 2;

/// Occupancy of a bus's caller buffer slots.
pub(crate) type SlotTable = Arc<Mutex<[bool; MAX_SLOTS]>>;

/// Holds one slot of a [`SlotTable`] and frees it when dropped.
struct Slot {
    table: SlotTable,
    index: usize,
}

impl Drop for Slot {
    fn drop(&mut self) {
        lock(&self.table)[self.index] = false;
    }
}

/// A heap byte buffer tagged with the capabilities it was allocated with.
pub struct FrameBuffer {
    data: Vec<u8>,
    caps: MemoryCaps,
    slot: Option<Slot>,
}

pub type SharedFrameBuffer = Arc<FrameBuffer>;

impl FrameBuffer {
    /// Allocates `size` zeroed bytes, failing with `OutOfMemory` instead of aborting.
    pub fn alloc(size: usize, caps: MemoryCaps) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory)?;
        data.resize(size, 0);
        Ok(Self {
            data,
            caps,
            slot: None,
        })
    }

    /// Allocates into a free slot of `table`; the slot is freed again when
    /// the buffer is dropped.
    ///
    /// # Errors
    ///
    /// `InvalidState` when every slot is taken, `OutOfMemory` if the
    /// allocation fails.
    pub(crate) fn alloc_in(size: usize, caps: MemoryCaps, table: &SlotTable) -> Result<Self> {
        let mut slots = lock(table);
        let index = slots
            .iter()
            .position(|taken| !taken)
            .ok_or(Error::InvalidState)?;
        let mut buffer = Self::alloc(size, caps)?;
        slots[index] = true;
        buffer.slot = Some(Slot {
            table: Arc::clone(table),
            index,
        });
        Ok(buffer)
    }

    /// Whether this buffer holds a slot of `table`.
    pub(crate) fn belongs_to(&self, table: &SlotTable) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| Arc::ptr_eq(&slot.table, table))
    }

    /// Wraps bytes the caller already owns.
    pub fn from_vec(data: Vec<u8>, caps: MemoryCaps) -> Self {
        Self {
            data,
            caps,
            slot: None,
        }
    }

    pub fn caps(&self) -> MemoryCaps {
        self.caps
    }

    pub fn into_shared(self) -> SharedFrameBuffer {
        Arc::new(self)
    }

    /// An RGB565 drawing surface over this buffer.
    pub fn canvas(&mut self, width: u16, height: u16) -> Result<Canvas<'_>> {
        Canvas::new(&mut self.data, width, height)
    }

    /// Transforms the packed `src` region into this frame. See [`transform`].
    pub fn transform_from(&mut self, src: &[u8], data: &RotationData) -> usize {
        transform(&mut self.data, src, data)
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for FrameBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl core::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("caps", &self.caps)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FrameBuffer {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FrameBuffer len: {} caps: {}", self.data.len(), self.caps);
    }
}
