//! A rotate/flush pipeline shared by every display bus.
//!
//! The renderer hands partial pixel buffers to an [`LcdBus`]. A worker thread
//! per bus rotates them into one of two frame buffers, or passes them through
//! untouched when nothing needs changing, and hands the result to a
//! [`Backend`](backend::Backend) that knows how to clock pixels onto a
//! particular wire: SPI, I2C, an Intel 8080 parallel bus, or a simulated panel.

pub mod backend;
pub mod bus;
pub mod channel;
pub mod error;
pub mod framebuffer;
pub mod region;
pub mod registry;
pub mod sync;
pub mod transform;
pub mod worker;

use embedded_graphics::pixelcolor::Rgb565;

pub use bus::BusConfig;
pub use bus::LcdBus;
pub use error::Error;
pub use error::Result;
pub use framebuffer::FrameBuffer;
pub use framebuffer::MemoryCaps;
pub use framebuffer::SharedFrameBuffer;
pub use region::PixelRegion;
pub use region::Rotation;
pub use worker::WorkerState;

/// Pixel type of the 16 bpp buses.
pub type Color = Rgb565;
