//! Intel 8080 style parallel bus, bit-banged over GPIO.
//!
//! The data lanes are set up first and latched by the panel on the rising
//! edge of WR. D/C is low for command words and high for data words. On a
//! 16-lane bus each word carries two bytes in memory order (little-endian).

use embedded_hal::digital::OutputPin;
use embedded_hal::digital::PinState;
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

pub struct I80Backend<P, const LANES: usize> {
    data: [P; LANES],
    wr: P,
    dc: P,
    cmd_bits: u8,
    done: Option<TxDone>,
}

impl<P: OutputPin, const LANES: usize> I80Backend<P, LANES> {
    /// `data[0]` is D0.
    pub fn new(data: [P; LANES], wr: P, dc: P) -> Self {
        Self {
            data,
            wr,
            dc,
            cmd_bits: 8,
            done: None,
        }
    }

    pub fn release(self) -> ([P; LANES], P, P) {
        (self.data, self.wr, self.dc)
    }

    fn clock_in(&mut self, word: u16) -> Result<()> {
        for (lane, pin) in self.data.iter_mut().enumerate() {
            pin.set_state(PinState::from(word & (1 << lane) != 0))
                .map_err(|_| Error::Bus("i80 data"))?;
        }
        self.wr.set_low().map_err(|_| Error::Bus("i80 wr"))?;
        self.wr.set_high().map_err(|_| Error::Bus("i80 wr"))
    }

    fn write(&mut self, bytes: &[u8], data: bool) -> Result<()> {
        self.dc
            .set_state(PinState::from(data))
            .map_err(|_| Error::Bus("i80 dc"))?;
        if LANES == 16 {
            for pair in bytes.chunks(2) {
                let word = u16::from(pair[0]) | u16::from(pair.get(1).copied().unwrap_or(0)) << 8;
                self.clock_in(word)?;
            }
        } else {
            for &byte in bytes {
                self.clock_in(u16::from(byte))?;
            }
        }
        Ok(())
    }

    fn command(&mut self, cmd: i32) -> Result<()> {
        if cmd < 0 {
            return Ok(());
        }
        if LANES == 16 {
            // a 16-lane bus sends the command as one word
            self.dc.set_low().map_err(|_| Error::Bus("i80 dc"))?;
            return self.clock_in(cmd as u16);
        }
        let word = encode_word(cmd, self.cmd_bits)?;
        self.write(&word, false)
    }
}

impl<P: OutputPin + Send, const LANES: usize> Backend for I80Backend<P, LANES> {
    fn init(&mut self, config: &BusConfig, done: TxDone) -> Result<()> {
        if LANES != 8 && LANES != 16 {
            return Err(Error::NotSupported);
        }
        if config.cmd_bits != 8 && config.cmd_bits != 16 {
            return Err(Error::InvalidArg);
        }
        self.cmd_bits = config.cmd_bits;
        self.wr.set_high().map_err(|_| Error::Bus("i80 wr"))?;
        self.done = Some(done);
        debug!("i80 backend ready: {LANES} lanes");
        Ok(())
    }

    fn tx_param(&mut self, cmd: i32, params: &[u8]) -> Result<()> {
        self.command(cmd)?;
        self.write(params, true)
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
        self.command(cmd)?;
        for chunk in buffer.chunks() {
            self.write(chunk, true)?;
        }
        done.complete(buffer, Ok(()));
        Ok(())
    }

    fn lane_count(&self) -> u8 {
        LANES as u8
    }
}
