//! I2C panels: every phase starts with a control byte telling the controller
//! whether command or display data follows.

use embedded_hal::i2c::I2c;
use embedded_hal::i2c::Operation;
use log::debug;

use super::encode_word;
use super::Backend;
use super::TxBuffer;
use super::TxDone;
use crate::bus::BusConfig;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::Error;
use crate::Result;

/// Control byte announcing command bytes.
pub const CONTROL_CMD: u8 = 0x00;
/// Control byte announcing display data.
pub const CONTROL_DATA: u8 = 0x40;

pub struct I2cBackend<I2C> {
    i2c: I2C,
    address: u8,
    control_cmd: u8,
    control_data: u8,
    cmd_bits: u8,
    done: Option<TxDone>,
}

impl<I2C: I2c> I2cBackend<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            control_cmd: CONTROL_CMD,
            control_data: CONTROL_DATA,
            cmd_bits: 8,
            done: None,
        }
    }

    /// Uses controller specific control bytes instead of the SSD1306 style ones.
    #[must_use]
    pub fn with_control_bytes(mut self, cmd: u8, data: u8) -> Self {
        self.control_cmd = cmd;
        self.control_data = data;
        self
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_command(&mut self, cmd: i32, params: &[u8]) -> Result<()> {
        let control = [self.control_cmd];
        let word = if cmd < 0 {
            heapless::Vec::new()
        } else {
            encode_word(cmd, self.cmd_bits)?
        };
        self.i2c
            .transaction(
                self.address,
                &mut [
                    Operation::Write(&control),
                    Operation::Write(&word),
                    Operation::Write(params),
                ],
            )
            .map_err(|_| Error::Bus("i2c write"))
    }
}

impl<I2C: I2c + Send> Backend for I2cBackend<I2C> {
    fn init(&mut self, config: &BusConfig, done: TxDone) -> Result<()> {
        if config.cmd_bits != 8 && config.cmd_bits != 16 {
            return Err(Error::InvalidArg);
        }
        self.cmd_bits = config.cmd_bits;
        self.done = Some(done);
        debug!("i2c backend ready at address {:#04x}", self.address);
        Ok(())
    }

    fn tx_param(&mut self, cmd: i32, params: &[u8]) -> Result<()> {
        self.write_command(cmd, params)
    }

    fn rx_param(&mut self, cmd: i32, buffer: &mut [u8]) -> Result<()> {
        let control = [self.control_cmd];
        let word = encode_word(cmd.max(0), self.cmd_bits)?;
        self.i2c
            .transaction(
                self.address,
                &mut [
                    Operation::Write(&control),
                    Operation::Write(&word),
                    Operation::Read(buffer),
                ],
            )
            .map_err(|_| Error::Bus("i2c read"))
    }

    /// Sends the pixels after `cmd`; the panel driver sets the address
    /// window to `region` beforehand.
    fn tx_color(
        &mut self,
        cmd: i32,
        buffer: TxBuffer,
        _region: &PixelRegion,
        _rotation: Rotation,
        _last_update: bool,
    ) -> Result<()> {
        let done = self.done.clone().ok_or(Error::InvalidState)?;
        if cmd >= 0 {
            self.write_command(cmd, &[])?;
        }
        let control = [self.control_data];
        for chunk in buffer.chunks() {
            self.i2c
                .transaction(
                    self.address,
                    &mut [Operation::Write(&control), Operation::Write(chunk)],
                )
                .map_err(|_| Error::Bus("i2c write"))?;
        }
        done.complete(buffer, Ok(()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;
    use crate::framebuffer::MemoryCaps;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal::i2c::ErrorType;
    use std::sync::Arc;
    use std::sync::Mutex;

    /// Records each transaction's written bytes concatenated, the way they
    /// appear on the wire after the address byte.
    #[derive(Clone, Default)]
    struct Wire {
        frames: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    impl ErrorType for Wire {
        type Error = ErrorKind;
    }

    impl I2c for Wire {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), ErrorKind> {
            let mut bytes = Vec::new();
            for op in operations {
                match op {
                    Operation::Write(data) => bytes.extend_from_slice(data),
                    Operation::Read(data) => data.fill(0xA5),
                }
            }
            self.frames.lock().unwrap().push((address, bytes));
            Ok(())
        }
    }

    fn backend() -> (I2cBackend<Wire>, Wire, TxDone) {
        let wire = Wire::default();
        let mut backend = I2cBackend::new(wire.clone(), 0x3C);
        let done = TxDone::new();
        backend.init(&BusConfig::new(8, 2, 8), done.clone()).unwrap();
        (backend, wire, done)
    }

    #[test]
    fn test_command_phase() {
        let (mut backend, wire, _) = backend();
        backend.tx_param(0x81, &[0x7F]).unwrap();
        backend.tx_param(0xAF, &[]).unwrap();
        assert_eq!(
            *wire.frames.lock().unwrap(),
            vec![(0x3C, vec![0x00, 0x81, 0x7F]), (0x3C, vec![0x00, 0xAF])]
        );
    }

    #[test]
    fn test_color_without_command() {
        let (mut backend, wire, done) = backend();
        let frame = FrameBuffer::from_vec(vec![1, 2, 3, 4], MemoryCaps::NONE).into_shared();
        let region = PixelRegion::full(2, 2);
        done.reset();
        backend
            .tx_color(-1, TxBuffer::packed(frame, 4), &region, Rotation::Deg0, true)
            .unwrap();
        assert_eq!(done.wait(None), Some(Ok(())));
        assert_eq!(
            *wire.frames.lock().unwrap(),
            vec![(0x3C, vec![0x40, 1, 2, 3, 4])]
        );
    }

    #[test]
    fn test_read_param() {
        let (mut backend, wire, _) = backend();
        let mut status = [0u8; 2];
        backend.rx_param(0x0A, &mut status).unwrap();
        assert_eq!(status, [0xA5, 0xA5]);
        assert_eq!(wire.frames.lock().unwrap()[0], (0x3C, vec![0x00, 0x0A]));
    }
}
