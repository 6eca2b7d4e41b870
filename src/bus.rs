//! The caller-facing bus handle.
//!
//! An [`LcdBus`] wraps one [`Backend`] and the worker thread that feeds it.
//! Flushes are synchronous unless a completion callback is registered, in
//! which case `flush` returns as soon as the worker has accepted the message.
//!
//! ```no_run
//! use esp_lcd_bus::backend::SimPanel;
//! use esp_lcd_bus::framebuffer::MemoryCaps;
//! use esp_lcd_bus::region::PixelRegion;
//! use esp_lcd_bus::{BusConfig, LcdBus};
//!
//! let bus = LcdBus::new(SimPanel::new());
//! bus.init(BusConfig::new(320, 240, 16)).unwrap();
//! let mut buffer = bus.allocate_framebuffer(320 * 10 * 2, MemoryCaps::DMA).unwrap();
//! std::sync::Arc::get_mut(&mut buffer).unwrap().fill(0xff);
//! bus.flush(PixelRegion::new(0, 0, 319, 9), buffer, true).unwrap();
//! ```

use core::sync::atomic::AtomicU8;
use core::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::thread::JoinHandle;

use log::debug;
use log::info;
use log::warn;

use crate::backend::Backend;
use crate::channel::FlushMessage;
use crate::framebuffer::FrameBuffer;
use crate::framebuffer::MemoryCaps;
use crate::framebuffer::SharedFrameBuffer;
use crate::framebuffer::SlotTable;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::sync::lock;
use crate::worker;
use crate::worker::Shared;
use crate::worker::SharedBackend;
use crate::worker::WorkerState;
use crate::Error;
use crate::Result;

const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Panel geometry and pipeline options, handed to the backend at init.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    /// Size of the partial buffers the caller flushes, in bytes. Backends
    /// with a transfer size limit split larger writes at this size; zero
    /// means no limit.
    pub buffer_size: usize,
    /// Swap the bytes of each RGB565 pixel before it goes out.
    pub rgb565_byte_swap: bool,
    pub cmd_bits: u8,
    pub param_bits: u8,
    /// Command sent ahead of pixel data; negative for none.
    pub color_cmd: i32,
    /// Apply 2x2 ordered dithering to RGB565 output.
    pub rgb565_dither: bool,
    /// Rotation in effect when the bus starts.
    pub rotation: Rotation,
    pub stack_size: usize,
    /// Name of the worker thread.
    pub name: String,
}

impl BusConfig {
    pub fn new(width: u16, height: u16, bits_per_pixel: u8) -> Self {
        let mut config = Self {
            width,
            height,
            bits_per_pixel,
            buffer_size: 0,
            rgb565_byte_swap: false,
            cmd_bits: 8,
            param_bits: 8,
            color_cmd: -1,
            rgb565_dither: false,
            rotation: Rotation::Deg0,
            stack_size: DEFAULT_STACK_SIZE,
            name: String::from("lcd-bus"),
        };
        config.buffer_size = config.frame_size();
        config
    }

    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn rgb565_byte_swap(mut self, swap: bool) -> Self {
        self.rgb565_byte_swap = swap;
        self
    }

    #[must_use]
    pub fn cmd_bits(mut self, bits: u8) -> Self {
        self.cmd_bits = bits;
        self
    }

    #[must_use]
    pub fn param_bits(mut self, bits: u8) -> Self {
        self.param_bits = bits;
        self
    }

    #[must_use]
    pub fn color_cmd(mut self, cmd: i32) -> Self {
        self.color_cmd = cmd;
        self
    }

    #[must_use]
    pub fn rgb565_dither(mut self, dither: bool) -> Self {
        self.rgb565_dither = dither;
        self
    }

    #[must_use]
    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize).div_ceil(8)
    }

    /// Bytes in one full frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidArg);
        }
        if !(1..=4).contains(&self.bytes_per_pixel()) {
            return Err(Error::InvalidArg);
        }
        Ok(())
    }
}

/// One display bus and its worker.
pub struct LcdBus {
    backend: SharedBackend,
    shared: Arc<Shared>,
    config: OnceLock<BusConfig>,
    worker: Mutex<Option<JoinHandle<()>>>,
    rotation: AtomicU8,
    /// Slots of the buffers handed out by `allocate_framebuffer`.
    framebuffers: SlotTable,
}

impl LcdBus {
    pub fn new<B: Backend + 'static>(backend: B) -> Self {
        let backend: Box<dyn Backend> = Box::new(backend);
        Self {
            backend: Arc::new(Mutex::new(backend)),
            shared: Arc::new(Shared::new()),
            config: OnceLock::new(),
            worker: Mutex::new(None),
            rotation: AtomicU8::new(Rotation::Deg0.as_index()),
            framebuffers: SlotTable::default(),
        }
    }

    /// Starts the worker and initialises the backend on it.
    ///
    /// Blocks until the worker has either become ready or failed. A bus whose
    /// init failed stays unusable: every later call reports the same error.
    ///
    /// # Errors
    ///
    /// `InvalidArg` for a bad config, `InvalidState` if called twice, or the
    /// `InitFailed`/`OutOfMemory` error reported by the worker.
    pub fn init(&self, config: BusConfig) -> Result<()> {
        config.validate()?;
        if self.config.set(config.clone()).is_err() {
            return Err(Error::InvalidState);
        }
        self.rotation
            .store(config.rotation.as_index(), Ordering::Release);
        debug!(
            "{}: starting worker, {} byte stack",
            config.name, config.stack_size
        );

        let name = config.name.clone();
        let handle = worker::spawn(config, Arc::clone(&self.backend), Arc::clone(&self.shared))?;
        match self.shared.wait_init() {
            Ok(()) => {
                *lock(&self.worker) = Some(handle);
                info!("{name}: bus initialised");
                Ok(())
            }
            Err(err) => {
                if handle.join().is_err() {
                    warn!("{name}: worker panicked during init");
                }
                Err(err)
            }
        }
    }

    /// Sends `buffer`, the packed pixels of `region`, to the panel.
    ///
    /// Without a completion callback this returns once the flush has been
    /// transmitted, with its outcome. With one it returns as soon as the
    /// worker has taken the previous flush, and the outcome goes to the callback.
    ///
    /// The bus holds on to `buffer` until it is done with it; use
    /// [`Arc::get_mut`] to find out when it can be drawn into again.
    pub fn flush(
        &self,
        region: PixelRegion,
        buffer: SharedFrameBuffer,
        last_update: bool,
    ) -> Result<()> {
        let config = self.ready_config()?;
        let message = FlushMessage {
            region: region.within(config.width, config.height),
            rotation: self.rotation(),
            last_update,
            buffer,
        };
        let ticket = self.shared.channel.post(message)?;
        if self.shared.channel.has_callback() {
            return Ok(());
        }
        self.shared.channel.wait_done(ticket)
    }

    /// Makes flushes asynchronous; `callback` runs on the worker thread once
    /// per flush with that flush's outcome.
    ///
    /// The callback must not call back into the bus's callback registration.
    pub fn register_completion_callback<F>(&self, callback: F)
    where
        F: FnMut(Result<()>) + Send + 'static,
    {
        self.shared.channel.set_callback(Some(Box::new(callback)));
    }

    /// Goes back to synchronous flushes.
    pub fn clear_completion_callback(&self) {
        self.shared.channel.set_callback(None);
    }

    /// Applies to flushes posted from now on.
    pub fn set_rotation(&self, rotation: Rotation) {
        self.rotation.store(rotation.as_index(), Ordering::Release);
    }

    pub fn rotation(&self) -> Rotation {
        Rotation::from_index(self.rotation.load(Ordering::Acquire))
    }

    /// Sends a command and its parameters.
    pub fn tx_param(&self, cmd: i32, params: &[u8]) -> Result<()> {
        self.ready_config()?;
        lock(&self.backend).tx_param(cmd, params)
    }

    /// Reads parameters back, where the bus supports it.
    pub fn rx_param(&self, cmd: i32, buffer: &mut [u8]) -> Result<()> {
        self.ready_config()?;
        lock(&self.backend).rx_param(cmd, buffer)
    }

    pub fn lane_count(&self) -> u8 {
        lock(&self.backend).lane_count()
    }

    /// Allocates a partial buffer for the caller to render into.
    ///
    /// At most two may be outstanding per bus. A buffer gives its slot back
    /// once its last reference is dropped, whether or not it went through
    /// [`free_framebuffer`](Self::free_framebuffer).
    ///
    /// # Errors
    ///
    /// `InvalidArg` for a zero size, `InvalidState` when both slots are taken,
    /// `OutOfMemory` if the allocation fails.
    pub fn allocate_framebuffer(&self, size: usize, caps: MemoryCaps) -> Result<SharedFrameBuffer> {
        if size == 0 {
            return Err(Error::InvalidArg);
        }
        let buffer = FrameBuffer::alloc_in(size, caps, &self.framebuffers)?;
        debug!("allocated {size} byte frame buffer, {caps:?}");
        Ok(buffer.into_shared())
    }

    /// Releases a buffer from [`allocate_framebuffer`](Self::allocate_framebuffer).
    ///
    /// The slot frees up when the last reference goes, so a buffer the bus
    /// is still transmitting keeps it until the transfer ends.
    ///
    /// # Errors
    ///
    /// `InvalidArg` if `buffer` was not allocated by this bus.
    pub fn free_framebuffer(&self, buffer: SharedFrameBuffer) -> Result<()> {
        if !buffer.belongs_to(&self.framebuffers) {
            return Err(Error::InvalidArg);
        }
        drop(buffer);
        Ok(())
    }

    /// True when every flush posted so far has completed.
    pub fn is_trans_done(&self) -> bool {
        self.shared.channel.is_trans_done()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.shared.state()
    }

    /// The config given to a successful or failed `init`.
    pub fn config(&self) -> Option<&BusConfig> {
        self.config.get()
    }

    /// Stops the worker and deletes the backend.
    ///
    /// A flush the worker has taken is allowed to finish and its caller gets
    /// the real outcome; one still waiting in the slot is dropped and its
    /// synchronous caller sees `Closed`. Calling this on a bus that never
    /// started is a no-op.
    pub fn deinit(&self) -> Result<()> {
        let Some(handle) = lock(&self.worker).take() else {
            return Ok(());
        };
        self.shared.channel.close();
        if handle.join().is_err() {
            warn!("bus worker panicked");
            self.shared.channel.abandon_taken(Err(Error::Closed));
        }
        self.shared.set_state(WorkerState::Terminated);
        let result = lock(&self.backend).del();
        info!("bus deinitialised");
        result
    }

    fn ready_config(&self) -> Result<&BusConfig> {
        if let Some(err) = self.shared.init_error() {
            return Err(err);
        }
        self.config.get().ok_or(Error::InvalidState)
    }
}

impl Drop for LcdBus {
    fn drop(&mut self) {
        if let Err(err) = self.deinit() {
            warn!("bus deinit on drop failed: {err}");
        }
    }
}
