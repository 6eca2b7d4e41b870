//! RGB565 byte swapping and 2x2 ordered dithering.

use embedded_graphics::pixelcolor::raw::RawData;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::pixelcolor::RgbColor;

/// Bayer threshold levels indexed by `[y & 1][x & 1]`.
pub const THRESHOLD: [[u8; 2]; 2] = [[0, 2], [3, 1]];

/// Swaps the two bytes of an RGB565 pixel for buses that expect big-endian data.
#[inline(always)]
pub const fn swap_rgb565(pixel: u16) -> u16 {
    pixel.swap_bytes()
}

/// Dithers one RGB565 pixel at destination position `(x, y)`.
///
/// Each threshold level adds a quarter of the channel's quantisation step in
/// 8-bit space before requantising; level 0 leaves the pixel untouched.
pub fn dither_rgb565(pixel: u16, x: usize, y: usize) -> u16 {
    let level = THRESHOLD[y & 1][x & 1];
    let wide = Rgb888::from(Rgb565::from(RawU16::new(pixel)));
    // red and blue step by 8 in 8-bit space, green by 4
    let r = wide.r().saturating_add(level * 2) >> 3;
    let g = wide.g().saturating_add(level) >> 2;
    let b = wide.b().saturating_add(level * 2) >> 3;
    RawU16::from(Rgb565::new(r, g, b)).into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(r: u8, g: u8, b: u8) -> u16 {
        RawU16::from(Rgb565::new(r, g, b)).into_inner()
    }

    #[test]
    fn test_swap_twice_is_identity() {
        for pixel in [0x0000, 0xF800, 0x07E0, 0x001F, 0x1234, 0xFFFF] {
            assert_eq!(swap_rgb565(swap_rgb565(pixel)), pixel);
        }
        assert_eq!(swap_rgb565(0xF800), 0x00F8);
    }

    #[test]
    fn test_level_zero_is_identity() {
        for r in 0..32 {
            for g in 0..64 {
                let pixel = pack(r, g, 31 - r);
                assert_eq!(dither_rgb565(pixel, 0, 0), pixel);
                assert_eq!(dither_rgb565(pixel, 2, 4), pixel);
            }
        }
    }

    #[test]
    fn test_dither_never_darkens() {
        for r in 0..32 {
            for g in 0..64 {
                let pixel = pack(r, g, r);
                for (x, y) in [(1, 0), (0, 1), (1, 1)] {
                    let out = Rgb565::from(RawU16::new(dither_rgb565(pixel, x, y)));
                    assert!(out.r() >= r && out.r() <= r + 1);
                    assert!(out.g() >= g && out.g() <= g + 1);
                    assert!(out.b() >= r && out.b() <= r + 1);
                }
            }
        }
    }

    #[test]
    fn test_white_and_black_are_stable() {
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(dither_rgb565(0xFFFF, x, y), 0xFFFF);
            assert_eq!(dither_rgb565(0x0000, x, y), 0x0000);
        }
    }

    #[test]
    fn test_pattern_varies_over_cell() {
        // a mid-level red whose 8-bit expansion sits just below the next step
        let pixel = pack(29, 0, 0);
        let cell: Vec<u16> = [(0, 0), (1, 0), (0, 1), (1, 1)]
            .iter()
            .map(|&(x, y)| dither_rgb565(pixel, x, y))
            .collect();
        assert_eq!(cell[0], pixel);
        assert!(cell.iter().any(|&p| p != pixel));
    }
}
