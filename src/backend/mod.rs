//! The interface between the pipeline and a concrete display bus.
//!
//! Every bus type implements [`Backend`]. The pipeline owns the backend
//! behind a mutex, calls [`Backend::init`] once on the worker thread and then
//! [`Backend::tx_color`] once per transmitted flush. Transfers complete through
//! the [`TxDone`] handle passed to `init`, from whatever thread or interrupt
//! context the bus finishes on.

use core::time::Duration;
use std::sync::Arc;
use std::sync::Mutex;

use crate::bus::BusConfig;
use crate::framebuffer::MemoryCaps;
use crate::framebuffer::SharedFrameBuffer;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::sync::lock;
use crate::sync::BinarySemaphore;
use crate::sync::Semaphore;
use crate::Error;
use crate::Result;

pub mod i2c;
pub mod i80;
pub mod sim;
pub mod spi;

pub use i2c::I2cBackend;
pub use i80::I80Backend;
pub use sim::SimPanel;
pub use spi::SpiBackend;

/// What a backend needs from the buffers handed to `tx_color`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BackendCaps {
    /// Capabilities the transmitted memory must have, e.g. DMA.
    pub buffer_caps: MemoryCaps,
    /// The bus can address a window, so partial updates are sent as they come.
    /// Otherwise updates accumulate and the whole frame goes out on `last_update`.
    pub windowed: bool,
    /// The bus swaps RGB565 bytes itself.
    pub hw_byte_swap: bool,
    /// Extra bytes appended to each internal frame buffer (LED framing and the like).
    pub frame_padding: usize,
}

impl Default for BackendCaps {
    fn default() -> Self {
        Self {
            buffer_caps: MemoryCaps::NONE,
            windowed: true,
            hw_byte_swap: false,
            frame_padding: 0,
        }
    }
}

/// A bus driver.
///
/// A command value below zero means "no command phase".
pub trait Backend: Send {
    /// Prepares the bus. Runs on the worker thread before it becomes ready.
    ///
    /// `done` must be kept and completed once for every successful `tx_color`.
    fn init(&mut self, config: &BusConfig, done: TxDone) -> Result<()>;

    fn caps(&self) -> BackendCaps {
        BackendCaps::default()
    }

    fn tx_param(&mut self, cmd: i32, params: &[u8]) -> Result<()>;

    fn rx_param(&mut self, _cmd: i32, _buffer: &mut [u8]) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Starts sending `buffer`, the pixels of `region` as laid out on the panel.
    ///
    /// `region` is in panel coordinates: under a software rotation it is the
    /// rotated window, not the one the renderer flushed. Buses that address
    /// a window themselves use it; the others rely on the panel driver having
    /// set the panel's window to it, e.g. from [`PixelRegion::rotated`].
    ///
    /// On `Ok` the transfer must later be finished with [`TxDone::complete`];
    /// on `Err` it must not be.
    fn tx_color(
        &mut self,
        cmd: i32,
        buffer: TxBuffer,
        region: &PixelRegion,
        rotation: Rotation,
        last_update: bool,
    ) -> Result<()>;

    fn del(&mut self) -> Result<()> {
        Ok(())
    }

    fn lane_count(&self) -> u8 {
        1
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn init(&mut self, config: &BusConfig, done: TxDone) -> Result<()> {
        (**self).init(config, done)
    }

    fn caps(&self) -> BackendCaps {
        (**self).caps()
    }

    fn tx_param(&mut self, cmd: i32, params: &[u8]) -> Result<()> {
        (**self).tx_param(cmd, params)
    }

    fn rx_param(&mut self, cmd: i32, buffer: &mut [u8]) -> Result<()> {
        (**self).rx_param(cmd, buffer)
    }

    fn tx_color(
        &mut self,
        cmd: i32,
        buffer: TxBuffer,
        region: &PixelRegion,
        rotation: Rotation,
        last_update: bool,
    ) -> Result<()> {
        (**self).tx_color(cmd, buffer, region, rotation, last_update)
    }

    fn del(&mut self) -> Result<()> {
        (**self).del()
    }

    fn lane_count(&self) -> u8 {
        (**self).lane_count()
    }
}

/// The bytes of one transfer: `rows` lines of `line` bytes, `stride` apart,
/// starting at `offset` in a shared buffer.
#[derive(Clone, Debug)]
pub struct TxBuffer {
    buffer: SharedFrameBuffer,
    offset: usize,
    line: usize,
    stride: usize,
    rows: usize,
}

impl TxBuffer {
    /// The first `len` bytes of `buffer` as one contiguous run.
    pub fn packed(buffer: SharedFrameBuffer, len: usize) -> Self {
        let len = len.min(buffer.len());
        Self {
            buffer,
            offset: 0,
            line: len,
            stride: len,
            rows: 1,
        }
    }

    /// The pixels of `region` inside a full frame buffer.
    ///
    /// # Errors
    ///
    /// `InvalidArg` if the window does not fit the buffer.
    pub fn window(
        buffer: SharedFrameBuffer,
        region: &PixelRegion,
        bytes_per_pixel: usize,
    ) -> Result<Self> {
        let stride = region.dst_width as usize * bytes_per_pixel;
        let offset = (region.y_start as usize * region.dst_width as usize + region.x_start as usize)
            * bytes_per_pixel;
        let line = region.width() * bytes_per_pixel;
        let rows = region.height();
        let fits = rows == 0
            || (region.x_end < region.dst_width
                && offset + (rows - 1) * stride + line <= buffer.len());
        if !fits {
            return Err(Error::InvalidArg);
        }
        Ok(Self {
            buffer,
            offset,
            line,
            stride,
            rows,
        })
    }

    pub fn buffer(&self) -> &SharedFrameBuffer {
        &self.buffer
    }

    /// Total number of bytes to send.
    pub fn len(&self) -> usize {
        self.line * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The transfer as slices, merging rows that are contiguous in memory.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let (line, rows) = if self.line == self.stride {
            (self.line * self.rows, self.rows.min(1))
        } else {
            (self.line, self.rows)
        };
        let data = &self.buffer[self.offset..];
        (0..rows).map(move |row| &data[row * self.stride..row * self.stride + line])
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.chunks().flatten().copied().collect()
    }
}

struct TxSignal {
    ready: Semaphore,
    result: Mutex<Option<Result<()>>>,
}

/// Completion handle for color transfers.
///
/// Cloneable so it can be moved into an interrupt handler or DMA callback.
#[derive(Clone)]
pub struct TxDone {
    signal: Arc<TxSignal>,
}

impl TxDone {
    pub(crate) fn new() -> Self {
        Self {
            signal: Arc::new(TxSignal {
                ready: Semaphore::new(false),
                result: Mutex::new(None),
            }),
        }
    }

    /// Reports the end of a transfer and gives the buffer back.
    ///
    /// The buffer is released before the pipeline is woken so it can be
    /// reused right away.
    pub fn complete(&self, buffer: TxBuffer, result: Result<()>) {
        drop(buffer);
        *lock(&self.signal.result) = Some(result);
        self.signal.ready.release();
    }

    pub(crate) fn reset(&self) {
        self.signal.ready.try_acquire();
        lock(&self.signal.result).take();
    }

    /// Waits for the pending transfer; `None` if it did not finish in time.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<Result<()>> {
        match timeout {
            Some(timeout) => {
                if !self.signal.ready.acquire_timeout(timeout) {
                    return None;
                }
            }
            None => self.signal.ready.acquire(),
        }
        let result = lock(&self.signal.result).take();
        Some(result.unwrap_or(Ok(())))
    }
}

impl core::fmt::Debug for TxDone {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TxDone").finish_non_exhaustive()
    }
}

/// Encodes a command or parameter value as big-endian bytes of `bits` width.
pub(crate) fn encode_word(value: i32, bits: u8) -> Result<heapless::Vec<u8, 2>> {
    let word = match bits {
        8 => heapless::Vec::from_slice(&[value as u8]),
        16 => heapless::Vec::from_slice(&(value as u16).to_be_bytes()),
        _ => return Err(Error::InvalidArg),
    };
    word.map_err(|_| Error::InvalidArg)
}
