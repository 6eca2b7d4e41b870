//! Geometry transform: copies a packed source region into a full destination
//! frame under one of the four rotations.
//!
//! The transform never allocates, never locks and never panics on a bad
//! region: out-of-frame coordinates are clipped and anything left over is
//! simply not written.
//!
//! ```
//! use esp_lcd_bus::region::{PixelRegion, Rotation, RotationData};
//! use esp_lcd_bus::transform::transform;
//!
//! // a 2x1 strip of 16-bit pixels rotated onto a 4x4 frame
//! let src = [0x11, 0x22, 0x33, 0x44];
//! let mut frame = [0u8; 4 * 4 * 2];
//! let data = RotationData {
//!     region: PixelRegion::new(0, 0, 1, 0).within(4, 4),
//!     bytes_per_pixel: 2,
//!     rotation: Rotation::Deg90,
//!     ..Default::default()
//! };
//! assert_eq!(transform(&mut frame, &src, &data), 4);
//! // logical (0, 0) is now at the bottom-left, logical (1, 0) just above it
//! assert_eq!(&frame[24..26], &[0x11, 0x22]);
//! assert_eq!(&frame[16..18], &[0x33, 0x44]);
//! ```

pub mod dither;
mod rotate;

use crate::region::Clamped;
use crate::region::Rotation;
use crate::region::RotationData;

/// Copies one pixel; also receives the destination coordinates for dithering.
pub type PixelCopy = fn(&[u8], &mut [u8], usize, usize);

/// Transforms `data.region` of the packed `src` into the frame `dst`.
///
/// Returns the number of bytes written into `dst`.
pub fn transform(dst: &mut [u8], src: &[u8], data: &RotationData) -> usize {
    let Some(mut area) = data.region.clamp(data.rotation) else {
        return 0;
    };
    let bpp = data.bytes_per_pixel as usize;
    if !(1..=4).contains(&bpp) || dst.len() < area.dst_width * area.dst_height * bpp {
        return 0;
    }

    // never read past what the caller handed us
    let available_rows = src.len() / (area.src_stride * bpp);
    area.y_end = area.y_end.min(area.y_start + available_rows);
    if area.rows() == 0 {
        return 0;
    }

    match bpp {
        1 => dispatch::<1>(dst, src, &area, data.rotation, None),
        2 => dispatch::<2>(dst, src, &area, data.rotation, rgb565_copy(data)),
        3 => dispatch::<3>(dst, src, &area, data.rotation, None),
        _ => dispatch::<4>(dst, src, &area, data.rotation, None),
    }
}

fn dispatch<const N: usize>(
    dst: &mut [u8],
    src: &[u8],
    area: &Clamped,
    rotation: Rotation,
    special: Option<PixelCopy>,
) -> usize {
    let copy = special.unwrap_or(copy_pixel::<N>);
    match rotation {
        Rotation::Deg0 if special.is_none() => rotate::copy_rows::<N>(dst, src, area),
        Rotation::Deg0 => rotate::copy_pixels::<N>(dst, src, area, copy),
        Rotation::Deg90 => {
            let last_row = area.dst_height - 1;
            rotate::remap::<N>(dst, src, area, copy, move |x, y| (y, last_row - x))
        }
        Rotation::Deg180 => rotate::mirror::<N>(dst, src, area, copy),
        Rotation::Deg270 => {
            let last_column = area.dst_width - 1;
            rotate::remap::<N>(dst, src, area, copy, move |x, y| (last_column - y, x))
        }
    }
}

/// Picks the 16-bit primitive once per call; `None` means plain copies.
fn rgb565_copy(data: &RotationData) -> Option<PixelCopy> {
    match (data.rgb565_byte_swap, data.rgb565_dither) {
        (false, false) => None,
        (true, false) => Some(copy_swapped),
        (false, true) => Some(copy_dithered),
        (true, true) => Some(copy_dithered_swapped),
    }
}

#[inline(always)]
fn copy_pixel<const N: usize>(src: &[u8], dst: &mut [u8], _x: usize, _y: usize) {
    dst.copy_from_slice(src);
}

fn copy_swapped(src: &[u8], dst: &mut [u8], _x: usize, _y: usize) {
    dst[0] = src[1];
    dst[1] = src[0];
}

fn copy_dithered(src: &[u8], dst: &mut [u8], x: usize, y: usize) {
    let pixel = dither::dither_rgb565(u16::from_le_bytes([src[0], src[1]]), x, y);
    dst.copy_from_slice(&pixel.to_le_bytes());
}

fn copy_dithered_swapped(src: &[u8], dst: &mut [u8], x: usize, y: usize) {
    let pixel = dither::dither_rgb565(u16::from_le_bytes([src[0], src[1]]), x, y);
    dst.copy_from_slice(&pixel.to_be_bytes());
}
