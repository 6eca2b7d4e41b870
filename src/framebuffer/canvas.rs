//! An embedded-graphics drawing surface over a packed RGB565 byte buffer.
//!
//! Pixels are stored little-endian, which is the layout the pipeline expects
//! from the renderer. Byte swapping for the panel happens in the transform.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::raw::RawData;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::prelude::*;

use crate::Color;
use crate::Error;
use crate::Result;

pub struct Canvas<'a> {
    data: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Canvas<'a> {
    /// # Errors
    ///
    /// `InvalidArg` when `data` is smaller than `width * height` pixels.
    pub fn new(data: &'a mut [u8], width: u16, height: u16) -> Result<Self> {
        let (width, height) = (width as usize, height as usize);
        if data.len() < width * height * 2 {
            return Err(Error::InvalidArg);
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    #[inline]
    fn offset(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) * 2)
    }

    /// Writes one pixel; coordinates outside the canvas are ignored.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        if p.x < 0 || p.y < 0 {
            return;
        }
        if let Some(i) = self.offset(p.x as usize, p.y as usize) {
            let raw = RawU16::from(color).into_inner();
            self.data[i..i + 2].copy_from_slice(&raw.to_le_bytes());
        }
    }

    pub fn pixel(&self, p: Point) -> Option<Color> {
        if p.x < 0 || p.y < 0 {
            return None;
        }
        let i = self.offset(p.x as usize, p.y as usize)?;
        let raw = u16::from_le_bytes([self.data[i], self.data[i + 1]]);
        Some(Color::from(RawU16::new(raw)))
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, color) in pixels {
            self.set_pixel(p, color);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let raw = RawU16::from(color).into_inner().to_le_bytes();
        for px in self.data[..self.width * self.height * 2].chunks_exact_mut(2) {
            px.copy_from_slice(&raw);
        }
        Ok(())
    }
}
