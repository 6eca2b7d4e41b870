//! 4-wire SPI panels: a D/C line selects between command and data bytes.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use log::debug;

use super::encode_word;
use super::Backend;
use super::BackendCaps;
use super::TxBuffer;
use super::TxDone;
use crate::bus::BusConfig;
use crate::framebuffer::MemoryCaps;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::Error;
use crate::Result;

pub struct SpiBackend<SPI, DC> {
    spi: SPI,
    dc: DC,
    cmd_bits: u8,
    param_bits: u8,
    /// Longest single data write.
    max_transfer: usize,
    buffer_caps: MemoryCaps,
    done: Option<TxDone>,
}

impl<SPI, DC> SpiBackend<SPI, DC>
where
    SPI: SpiDevice,
    DC: OutputPin,
{
    pub fn new(spi: SPI, dc: DC) -> Self {
        Self {
            spi,
            dc,
            cmd_bits: 8,
            param_bits: 8,
            max_transfer: usize::MAX,
            buffer_caps: MemoryCaps::DMA,
            done: None,
        }
    }

    /// Overrides the memory the SPI master can read from (DMA by default).
    #[must_use]
    pub fn with_buffer_caps(mut self, caps: MemoryCaps) -> Self {
        self.buffer_caps = caps;
        self
    }

    /// Gives back the bus and D/C pin.
    pub fn release(self) -> (SPI, DC) {
        (self.spi, self.dc)
    }

    fn command(&mut self, cmd: i32) -> Result<()> {
        if cmd < 0 {
            return Ok(());
        }
        let word = encode_word(cmd, self.cmd_bits)?;
        self.dc.set_low().map_err(|_| Error::Bus("dc pin"))?;
        self.spi.write(&word).map_err(|_| Error::Bus("spi write"))
    }

    fn data(&mut self, bytes: &[u8]) -> Result<()> {
        self.dc.set_high().map_err(|_| Error::Bus("dc pin"))?;
        self.spi.write(bytes).map_err(|_| Error::Bus("spi write"))
    }
}

impl<SPI, DC> Backend for SpiBackend<SPI, DC>
where
    SPI: SpiDevice + Send,
    DC: OutputPin + Send,
{
    fn init(&mut self, config: &BusConfig, done: TxDone) -> Result<()> {
        for bits in [config.cmd_bits, config.param_bits] {
            if bits != 8 && bits != 16 {
                return Err(Error::InvalidArg);
            }
        }
        self.cmd_bits = config.cmd_bits;
        self.param_bits = config.param_bits;
        self.max_transfer = match config.buffer_size {
            0 => usize::MAX,
            size => size,
        };
        self.done = Some(done);
        debug!(
            "spi backend ready: {} bit commands, {} bit params, {} byte transfers",
            self.cmd_bits, self.param_bits, config.buffer_size
        );
        Ok(())
    }

    fn caps(&self) -> BackendCaps {
        BackendCaps {
            buffer_caps: self.buffer_caps,
            ..BackendCaps::default()
        }
    }

    fn tx_param(&mut self, cmd: i32, params: &[u8]) -> Result<()> {
        // 16-bit parameters go out as whole words
        if self.param_bits == 16 && params.len() % 2 != 0 {
            return Err(Error::InvalidArg);
        }
        self.command(cmd)?;
        if params.is_empty() {
            return Ok(());
        }
        self.data(params)
    }

    fn rx_param(&mut self, cmd: i32, buffer: &mut [u8]) -> Result<()> {
        self.command(cmd)?;
        self.dc.set_high().map_err(|_| Error::Bus("dc pin"))?;
        self.spi.read(buffer).map_err(|_| Error::Bus("spi read"))
    }

    /// Writes the pixels after `cmd`. The panel's address window is not
    /// touched: the panel driver sets it to `region` beforehand.
    fn tx_color(
        &mut self,
        cmd: i32,
        buffer: TxBuffer,
        _region: &PixelRegion,
        _rotation: Rotation,
        _last_update: bool,
    ) -> Result<()> {
        let done = self.done.clone().ok_or(Error::InvalidState)?;
        self.command(cmd)?;
        for chunk in buffer.chunks() {
            for part in chunk.chunks(self.max_transfer) {
                self.data(part)?;
            }
        }
        done.complete(buffer, Ok(()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType as PinErrorType;
    use embedded_hal::spi::ErrorKind;
    use embedded_hal::spi::ErrorType;
    use embedded_hal::spi::Operation;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Dc(bool),
        Write(Vec<u8>),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
        fail: bool,
    }

    impl ErrorType for Recorder {
        type Error = ErrorKind;
    }

    impl SpiDevice for Recorder {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), ErrorKind> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.events.lock().unwrap().push(Event::Write(bytes.to_vec()))
                    }
                    Operation::Read(bytes) => bytes.fill(0x5A),
                    _ => {}
                }
            }
            Ok(())
        }
    }

    struct Dc(Arc<Mutex<Vec<Event>>>);

    impl PinErrorType for Dc {
        type Error = Infallible;
    }

    impl OutputPin for Dc {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.lock().unwrap().push(Event::Dc(false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.lock().unwrap().push(Event::Dc(true));
            Ok(())
        }
    }

    fn backend(fail: bool) -> (SpiBackend<Recorder, Dc>, Arc<Mutex<Vec<Event>>>, TxDone) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let spi = Recorder {
            events: Arc::clone(&events),
            fail,
        };
        let mut backend = SpiBackend::new(spi, Dc(Arc::clone(&events)));
        let done = TxDone::new();
        backend
            .init(&BusConfig::new(4, 2, 16), done.clone())
            .unwrap();
        (backend, events, done)
    }

    #[test]
    fn test_param_framing() {
        let (mut backend, events, _) = backend(false);
        backend.tx_param(0x36, &[0x48]).unwrap();
        backend.tx_param(0x29, &[]).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                Event::Dc(false),
                Event::Write(vec![0x36]),
                Event::Dc(true),
                Event::Write(vec![0x48]),
                Event::Dc(false),
                Event::Write(vec![0x29]),
            ]
        );
    }

    #[test]
    fn test_sixteen_bit_commands() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let spi = Recorder {
            events: Arc::clone(&events),
            fail: false,
        };
        let mut backend = SpiBackend::new(spi, Dc(Arc::clone(&events)));
        let config = BusConfig::new(4, 2, 16).cmd_bits(16).param_bits(16);
        backend.init(&config, TxDone::new()).unwrap();
        backend.tx_param(0x2A00, &[0x00, 0x10]).unwrap();
        assert_eq!(backend.tx_param(0x2A00, &[0x00]).unwrap_err(), Error::InvalidArg);
        assert_eq!(events.lock().unwrap()[1], Event::Write(vec![0x2A, 0x00]));
    }

    #[test]
    fn test_rejects_odd_command_width() {
        let mut backend = SpiBackend::new(Recorder::default(), Dc(Arc::default()));
        let config = BusConfig::new(4, 2, 16).cmd_bits(12);
        assert_eq!(
            backend.init(&config, TxDone::new()).unwrap_err(),
            Error::InvalidArg
        );
    }

    #[test]
    fn test_color_window_rows() {
        let (mut backend, events, done) = backend(false);
        let frame = FrameBuffer::from_vec((0..16).collect(), MemoryCaps::DMA).into_shared();
        let region = PixelRegion::new(1, 0, 2, 1).within(4, 2);
        let tx = TxBuffer::window(Arc::clone(&frame), &region, 2).unwrap();
        done.reset();
        backend
            .tx_color(0x2C, tx, &region, Rotation::Deg0, true)
            .unwrap();
        assert_eq!(done.wait(None), Some(Ok(())));
        assert_eq!(Arc::strong_count(&frame), 1);
        let writes: Vec<Event> = events.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![
                Event::Dc(false),
                Event::Write(vec![0x2C]),
                Event::Dc(true),
                Event::Write(vec![2, 3, 4, 5]),
                Event::Dc(true),
                Event::Write(vec![10, 11, 12, 13]),
            ]
        );
    }

    #[test]
    fn test_writes_split_at_buffer_size() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let spi = Recorder {
            events: Arc::clone(&events),
            fail: false,
        };
        let mut backend = SpiBackend::new(spi, Dc(Arc::clone(&events)));
        let done = TxDone::new();
        backend
            .init(&BusConfig::new(4, 2, 16).buffer_size(6), done.clone())
            .unwrap();
        let frame = FrameBuffer::from_vec((0..16).collect(), MemoryCaps::DMA).into_shared();
        let region = PixelRegion::full(4, 2);
        backend
            .tx_color(-1, TxBuffer::packed(frame, 16), &region, Rotation::Deg0, true)
            .unwrap();
        assert_eq!(done.wait(None), Some(Ok(())));
        let writes: Vec<usize> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Write(bytes) => Some(bytes.len()),
                Event::Dc(_) => None,
            })
            .collect();
        assert_eq!(writes, vec![6, 6, 4]);
    }

    #[test]
    fn test_write_failure_does_not_complete() {
        let (mut backend, _, done) = backend(true);
        let frame = FrameBuffer::from_vec(vec![0; 16], MemoryCaps::DMA).into_shared();
        done.reset();
        let region = PixelRegion::full(4, 2);
        let err = backend
            .tx_color(0x2C, TxBuffer::packed(frame, 16), &region, Rotation::Deg0, true)
            .unwrap_err();
        assert_eq!(err, Error::Bus("spi write"));
        assert_eq!(done.wait(Some(std::time::Duration::from_millis(5))), None);
    }

    #[test]
    fn test_read_param() {
        let (mut backend, _, _) = backend(false);
        let mut id = [0u8; 3];
        backend.rx_param(0x04, &mut id).unwrap();
        assert_eq!(id, [0x5A; 3]);
    }
}
