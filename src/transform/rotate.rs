//! Per-orientation copy loops.
//!
//! Every loop is generic over the pixel width `N` so the compiler emits one
//! specialised body per width, and over the pixel copy primitive picked once
//! per call by the caller.

use super::PixelCopy;
use crate::region::Clamped;

/// 0° without swap or dither: straight scanline copies.
///
/// When the region spans whole destination rows and the source pitch equals
/// the destination pitch the rows are contiguous and go in one copy.
pub(super) fn copy_rows<const N: usize>(dst: &mut [u8], src: &[u8], area: &Clamped) -> usize {
    let rows = area.rows();
    let line = area.columns() * N;
    let src_line = area.src_stride * N;
    let dst_line = area.dst_width * N;
    let mut dst_offset = (area.y_start * area.dst_width + area.x_start) * N;

    if line == dst_line && src_line == dst_line {
        let len = line * rows;
        dst[dst_offset..dst_offset + len].copy_from_slice(&src[..len]);
        return len;
    }

    for src_row in src.chunks_exact(src_line).take(rows) {
        dst[dst_offset..dst_offset + line].copy_from_slice(&src_row[..line]);
        dst_offset += dst_line;
    }
    line * rows
}

/// 0° through a pixel primitive (byte swap and/or dither).
pub(super) fn copy_pixels<const N: usize>(
    dst: &mut [u8],
    src: &[u8],
    area: &Clamped,
    copy: PixelCopy,
) -> usize {
    remap::<N>(dst, src, area, copy, |x, y| (x, y))
}

/// 90° and 270°: per-pixel index remapping through `to_dst`, which turns a
/// logical `(x, y)` into a destination `(x', y')`.
pub(super) fn remap<const N: usize>(
    dst: &mut [u8],
    src: &[u8],
    area: &Clamped,
    copy: PixelCopy,
    to_dst: impl Fn(usize, usize) -> (usize, usize),
) -> usize {
    let src_line = area.src_stride * N;
    let columns = area.columns();
    let mut written = 0;

    for (y, src_row) in (area.y_start..area.y_end).zip(src.chunks_exact(src_line)) {
        for (x, px) in (area.x_start..=area.x_end).zip(src_row[..columns * N].chunks_exact(N)) {
            let (dx, dy) = to_dst(x, y);
            let j = (dy * area.dst_width + dx) * N;
            copy(px, &mut dst[j..j + N], dx, dy);
        }
        written += columns * N;
    }
    written
}

/// 180°: each source scanline lands reversed on the mirrored destination row.
pub(super) fn mirror<const N: usize>(
    dst: &mut [u8],
    src: &[u8],
    area: &Clamped,
    copy: PixelCopy,
) -> usize {
    let src_line = area.src_stride * N;
    let dst_line = area.dst_width * N;
    let columns = area.columns();
    let last_column = area.dst_width - 1;
    let mut written = 0;

    for (y, src_row) in (area.y_start..area.y_end).zip(src.chunks_exact(src_line)) {
        let dy = area.dst_height - 1 - y;
        let dst_row = &mut dst[dy * dst_line..(dy + 1) * dst_line];
        for (x, px) in (area.x_start..=area.x_end).zip(src_row[..columns * N].chunks_exact(N)) {
            let dx = last_column - x;
            copy(px, &mut dst_row[dx * N..(dx + 1) * N], dx, dy);
        }
        written += columns * N;
    }
    written
}
