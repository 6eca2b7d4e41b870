//! The per-bus worker thread.
//!
//! The worker owns the two internal frame buffers. It initialises the
//! backend, reports the outcome exactly once through the init rendezvous and
//! then loops: wait for a flush, transform it if needed, transmit, swap.

use core::sync::atomic::AtomicU8;
use core::sync::atomic::Ordering;
use core::time::Duration;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use log::debug;
use log::error;
use log::info;
use log::trace;
use log::warn;

use crate::backend::Backend;
use crate::backend::BackendCaps;
use crate::backend::TxBuffer;
use crate::backend::TxDone;
use crate::bus::BusConfig;
use crate::channel::FlushChannel;
use crate::channel::FlushMessage;
use crate::framebuffer::FrameBufferSet;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::region::RotationData;
use crate::sync::lock;
use crate::sync::BinarySemaphore;
use crate::sync::Semaphore;
use crate::transform::transform;
use crate::Error;
use crate::Result;

/// Where the worker is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WorkerState {
    Initializing,
    Ready,
    Waiting,
    Processing,
    Exiting,
    Terminated,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Initializing,
            1 => WorkerState::Ready,
            2 => WorkerState::Waiting,
            3 => WorkerState::Processing,
            4 => WorkerState::Exiting,
            _ => WorkerState::Terminated,
        }
    }

    /// Ready, waiting or processing.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            WorkerState::Ready | WorkerState::Waiting | WorkerState::Processing
        )
    }
}

pub(crate) type SharedBackend = Arc<Mutex<Box<dyn Backend>>>;

/// How long a transfer may run before the worker logs it as stalled.
const TX_STALL_WARNING: Duration = Duration::from_secs(1);

/// State shared between a bus handle and its worker.
pub(crate) struct Shared {
    pub channel: FlushChannel<FlushMessage>,
    state: AtomicU8,
    /// Taken at construction, released once by the worker after init.
    init_lock: Semaphore,
    init_error: Mutex<Option<Error>>,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            channel: FlushChannel::new(),
            state: AtomicU8::new(WorkerState::Initializing as u8),
            init_lock: Semaphore::new(false),
            init_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn init_error(&self) -> Option<Error> {
        lock(&self.init_error).clone()
    }

    /// Stores a fatal init error and ends the rendezvous.
    pub fn fail_init(&self, err: Error) {
        error!("bus init failed: {err}");
        *lock(&self.init_error) = Some(err);
        self.set_state(WorkerState::Terminated);
        self.init_lock.release();
    }

    /// Blocks until the worker has reported the outcome of its init.
    pub fn wait_init(&self) -> Result<()> {
        self.init_lock.acquire();
        match self.init_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Starts the worker thread for a bus.
///
/// The caller must follow up with [`Shared::wait_init`].
pub(crate) fn spawn(
    config: BusConfig,
    backend: SharedBackend,
    shared: Arc<Shared>,
) -> Result<JoinHandle<()>> {
    let builder = thread::Builder::new()
        .name(config.name.clone())
        .stack_size(config.stack_size);
    let worker_shared = Arc::clone(&shared);
    builder
        .spawn(move || run(config, backend, worker_shared))
        .map_err(|err| {
            let err = Error::InitFailed {
                code: crate::error::ESP_ERR_NO_MEM,
                message: err.to_string(),
            };
            shared.fail_init(err.clone());
            err
        })
}

fn run(config: BusConfig, backend: SharedBackend, shared: Arc<Shared>) {
    let worker = match Worker::init(config, backend, Arc::clone(&shared)) {
        Ok(worker) => worker,
        Err(err) => {
            shared.fail_init(err);
            return;
        }
    };
    shared.set_state(WorkerState::Ready);
    info!("{} worker ready", worker.config.name);
    shared.init_lock.release();
    worker.run();
}

struct Worker {
    config: BusConfig,
    backend: SharedBackend,
    shared: Arc<Shared>,
    done: TxDone,
    caps: BackendCaps,
    frames: FrameBufferSet,
}

impl Worker {
    fn init(config: BusConfig, backend: SharedBackend, shared: Arc<Shared>) -> Result<Self> {
        let done = TxDone::new();
        let caps = {
            let mut backend = lock(&backend);
            backend
                .init(&config, done.clone())
                .map_err(Error::into_init_failure)?;
            backend.caps()
        };
        let size = config.frame_size().saturating_add(caps.frame_padding);
        debug!(
            "{}: {}x{} @ {} bpp, frame buffers of {size} bytes, {caps:?}",
            config.name, config.width, config.height, config.bits_per_pixel
        );
        let frames = FrameBufferSet::alloc(size, caps.buffer_caps)?;
        Ok(Self {
            config,
            backend,
            shared,
            done,
            caps,
            frames,
        })
    }

    fn run(mut self) {
        loop {
            // exit is only honoured between flushes
            if self.shared.channel.is_closed() {
                break;
            }
            self.shared.set_state(WorkerState::Waiting);
            let Some(message) = self.shared.channel.take() else {
                break;
            };
            self.shared.set_state(WorkerState::Processing);
            let result = self.process(message);
            if let Err(err) = &result {
                warn!("{}: flush failed: {err}", self.config.name);
            }
            self.shared.channel.signal_done(result);
        }
        self.shared.set_state(WorkerState::Exiting);
        info!("{} worker exiting", self.config.name);
        self.shared.set_state(WorkerState::Terminated);
    }

    /// Whether the caller's buffer can be sent as is.
    fn zero_copy(&self, message: &FlushMessage, data: &RotationData) -> bool {
        let region = &data.region;
        let len = region.pixel_count() * data.bytes_per_pixel as usize;
        self.caps.windowed
            && data.rotation == Rotation::Deg0
            && !data.rgb565_byte_swap
            && !data.rgb565_dither
            && region.x_end < region.dst_width
            && region.y_end < region.dst_height
            && message.buffer.len() >= len
            && message.buffer.caps().satisfies(self.caps.buffer_caps)
    }

    fn process(&mut self, message: FlushMessage) -> Result<()> {
        let bpp = self.config.bytes_per_pixel();
        let region = message
            .region
            .within(self.config.width, self.config.height);
        let data = RotationData {
            region,
            bytes_per_pixel: bpp as u8,
            rotation: message.rotation,
            rgb565_byte_swap: self.config.rgb565_byte_swap && bpp == 2 && !self.caps.hw_byte_swap,
            rgb565_dither: self.config.rgb565_dither && bpp == 2,
            last_update: message.last_update,
        };

        if self.zero_copy(&message, &data) {
            trace!("{}: zero-copy flush of {region:?}", self.config.name);
            let tx = TxBuffer::packed(message.buffer, region.pixel_count() * bpp);
            return self.transmit(tx, &region, &data);
        }

        let frame = self.frames.begin_transform()?;
        let written = transform(frame, &message.buffer, &data);
        self.frames.end_transform()?;
        let source_len = message.buffer.len();
        // the caller may reuse its buffer from here on
        drop(message);
        trace!(
            "{}: transformed {written} bytes for {region:?} at {:?}",
            self.config.name,
            data.rotation
        );

        if self.caps.windowed {
            // only the rows the transform wrote; the rest of the buffer is stale
            let window = region
                .limit_to_source(source_len, bpp)
                .and_then(|filled| filled.rotated(data.rotation));
            let Some(window) = window else {
                return Ok(());
            };
            let buffer = self.frames.begin_tx()?;
            let tx = match TxBuffer::window(buffer, &window, bpp) {
                Ok(tx) => tx,
                Err(err) => {
                    self.frames.finish_tx(false)?;
                    return Err(err);
                }
            };
            let result = self.transmit(tx, &window, &data);
            self.frames.finish_tx(result.is_ok())?;
            return result;
        }

        if !data.last_update {
            // full-frame panels only get whole frames
            return Ok(());
        }
        let buffer = self.frames.begin_tx()?;
        let len = buffer.len();
        let full = PixelRegion::full(self.config.width, self.config.height);
        let result = self.transmit(TxBuffer::packed(buffer, len), &full, &data);
        self.frames.finish_tx(result.is_ok())?;
        if result.is_ok() {
            self.frames.copy_forward()?;
        }
        result
    }

    /// Sends one buffer and waits for the backend to report completion.
    fn transmit(&self, tx: TxBuffer, region: &PixelRegion, data: &RotationData) -> Result<()> {
        self.done.reset();
        lock(&self.backend)
            .tx_color(
                self.config.color_cmd,
                tx,
                region,
                data.rotation,
                data.last_update,
            )
            .map_err(Error::into_transmit_failure)?;
        let result = match self.done.wait(Some(TX_STALL_WARNING)) {
            Some(result) => result,
            None => {
                warn!(
                    "{}: transfer still running after {TX_STALL_WARNING:?}",
                    self.config.name
                );
                self.done.wait(None).unwrap_or(Ok(()))
            }
        };
        result.map_err(Error::into_transmit_failure)
    }
}
