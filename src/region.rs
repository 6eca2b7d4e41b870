//! Rectangles, rotations and the per-flush transform parameters.

use embedded_graphics::geometry::Point;
use embedded_graphics::primitives::Rectangle;

/// Display orientation, applied clockwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub const fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True for 90° and 270°, where the logical width is the frame height.
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// The rotation that undoes this one.
    pub const fn inverse(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg0,
            Rotation::Deg90 => Rotation::Deg270,
            Rotation::Deg180 => Rotation::Deg180,
            Rotation::Deg270 => Rotation::Deg90,
        }
    }

    pub(crate) const fn as_index(self) -> u8 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 1,
            Rotation::Deg180 => 2,
            Rotation::Deg270 => 3,
        }
    }

    pub(crate) const fn from_index(index: u8) -> Self {
        match index & 3 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }
}

/// An inclusive pixel rectangle plus the size of the frame it lands in.
///
/// The coordinates are in the renderer's (logical) space; `dst_width` and
/// `dst_height` always describe the physical frame buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRegion {
    pub x_start: u16,
    pub y_start: u16,
    pub x_end: u16,
    pub y_end: u16,
    pub dst_width: u16,
    pub dst_height: u16,
}

impl PixelRegion {
    /// A region with no frame attached yet, see [`PixelRegion::within`].
    pub const fn new(x_start: u16, y_start: u16, x_end: u16, y_end: u16) -> Self {
        Self {
            x_start,
            y_start,
            x_end,
            y_end,
            dst_width: 0,
            dst_height: 0,
        }
    }

    /// The whole of a `width` x `height` frame.
    pub const fn full(width: u16, height: u16) -> Self {
        Self {
            x_start: 0,
            y_start: 0,
            x_end: width.saturating_sub(1),
            y_end: height.saturating_sub(1),
            dst_width: width,
            dst_height: height,
        }
    }

    #[must_use]
    pub const fn within(mut self, dst_width: u16, dst_height: u16) -> Self {
        self.dst_width = dst_width;
        self.dst_height = dst_height;
        self
    }

    pub const fn width(&self) -> usize {
        if self.x_end < self.x_start {
            0
        } else {
            (self.x_end - self.x_start) as usize + 1
        }
    }

    pub const fn height(&self) -> usize {
        if self.y_end < self.y_start {
            0
        } else {
            (self.y_end - self.y_start) as usize + 1
        }
    }

    pub const fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    pub const fn is_full_frame(&self) -> bool {
        self.x_start == 0
            && self.y_start == 0
            && self.x_end as usize + 1 == self.dst_width as usize
            && self.y_end as usize + 1 == self.dst_height as usize
    }

    /// Clips the region against the frame for the given rotation.
    ///
    /// Returns `None` when nothing of the region lies inside the frame.
    pub(crate) fn clamp(&self, rotation: Rotation) -> Option<Clamped> {
        let dst_width = self.dst_width as usize;
        let dst_height = self.dst_height as usize;
        if dst_width == 0 || dst_height == 0 || self.x_end < self.x_start || self.y_end < self.y_start
        {
            return None;
        }

        let (x_limit, y_limit) = if rotation.swaps_axes() {
            (dst_height, dst_width)
        } else {
            (dst_width, dst_height)
        };
        let x_start = self.x_start as usize;
        let y_start = self.y_start as usize;
        if x_start >= x_limit || y_start >= y_limit {
            return None;
        }

        let x_end = (self.x_end as usize).min(x_limit - 1);
        // inclusive y_end advanced by one row into an exclusive bound, the
        // same for every rotation
        let y_end = (self.y_end as usize + 1).min(y_limit);

        Some(Clamped {
            x_start,
            x_end,
            y_start,
            y_end,
            src_stride: self.width(),
            dst_width,
            dst_height,
        })
    }

    /// Drops the rows a packed source of `len` bytes does not hold.
    ///
    /// `None` when the source does not hold a single row.
    pub fn limit_to_source(&self, len: usize, bytes_per_pixel: usize) -> Option<PixelRegion> {
        let pitch = self.width() * bytes_per_pixel;
        if pitch == 0 || self.height() == 0 {
            return None;
        }
        let rows = len / pitch;
        if rows == 0 {
            return None;
        }
        let mut region = *self;
        let last_row = self.y_start as usize + rows - 1;
        if last_row < self.y_end as usize {
            region.y_end = last_row as u16;
        }
        Some(region)
    }

    /// The physical rectangle a transform of this region under `rotation` writes.
    pub fn rotated(&self, rotation: Rotation) -> Option<PixelRegion> {
        let area = self.clamp(rotation)?;
        let (w, h) = (area.dst_width, area.dst_height);
        let (xs, xe) = (area.x_start, area.x_end);
        let (ys, ye) = (area.y_start, area.y_end - 1);
        let (x_start, y_start, x_end, y_end) = match rotation {
            Rotation::Deg0 => (xs, ys, xe, ye),
            Rotation::Deg90 => (ys, h - 1 - xe, ye, h - 1 - xs),
            Rotation::Deg180 => (w - 1 - xe, h - 1 - ye, w - 1 - xs, h - 1 - ys),
            Rotation::Deg270 => (w - 1 - ye, xs, w - 1 - ys, xe),
        };
        Some(PixelRegion {
            x_start: x_start as u16,
            y_start: y_start as u16,
            x_end: x_end as u16,
            y_end: y_end as u16,
            dst_width: self.dst_width,
            dst_height: self.dst_height,
        })
    }

    /// Converts an embedded-graphics rectangle; empty or negative rectangles have no region.
    pub fn from_rectangle(rect: &Rectangle) -> Option<Self> {
        let top_left = rect.top_left;
        let bottom_right = rect.bottom_right()?;
        if top_left.x < 0 || top_left.y < 0 {
            return None;
        }
        let x_end = u16::try_from(bottom_right.x).ok()?;
        let y_end = u16::try_from(bottom_right.y).ok()?;
        Some(Self::new(top_left.x as u16, top_left.y as u16, x_end, y_end))
    }
}

impl From<PixelRegion> for Rectangle {
    fn from(region: PixelRegion) -> Self {
        Rectangle::with_corners(
            Point::new(region.x_start.into(), region.y_start.into()),
            Point::new(region.x_end.into(), region.y_end.into()),
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PixelRegion {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "({}, {})..=({}, {}) in {}x{}",
            self.x_start,
            self.y_start,
            self.x_end,
            self.y_end,
            self.dst_width,
            self.dst_height
        );
    }
}

/// A region clipped against its frame.
///
/// `y_end` is exclusive, the x bounds are inclusive and `src_stride` is the
/// pixel width of the caller's (unclipped) region, i.e. the row pitch of the
/// packed source buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Clamped {
    pub x_start: usize,
    pub x_end: usize,
    pub y_start: usize,
    pub y_end: usize,
    pub src_stride: usize,
    pub dst_width: usize,
    pub dst_height: usize,
}

impl Clamped {
    pub fn columns(&self) -> usize {
        self.x_end - self.x_start + 1
    }

    pub fn rows(&self) -> usize {
        self.y_end - self.y_start
    }
}

/// Everything the geometry transform needs for one flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RotationData {
    pub region: PixelRegion,
    pub bytes_per_pixel: u8,
    pub rotation: Rotation,
    pub rgb565_byte_swap: bool,
    pub rgb565_dither: bool,
    pub last_update: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::geometry::Size;

    #[test]
    fn test_rotation_degrees() {
        for degrees in [0, 90, 180, 270] {
            let rotation = Rotation::from_degrees(degrees).unwrap();
            assert_eq!(rotation.degrees(), degrees);
            assert_eq!(Rotation::from_index(rotation.as_index()), rotation);
        }
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Deg90.inverse(), Rotation::Deg270);
        assert!(Rotation::Deg270.swaps_axes());
        assert!(!Rotation::Deg180.swaps_axes());
    }

    #[test]
    fn test_region_size() {
        let region = PixelRegion::new(10, 20, 19, 21).within(100, 50);
        assert_eq!(region.width(), 10);
        assert_eq!(region.height(), 2);
        assert_eq!(region.pixel_count(), 20);
        assert!(!region.is_full_frame());
        assert!(PixelRegion::full(100, 50).is_full_frame());
        assert_eq!(PixelRegion::new(5, 5, 4, 9).width(), 0);
    }

    #[test]
    fn test_clamp_end_against_frame() {
        let area = PixelRegion::new(90, 0, 120, 9)
            .within(100, 10)
            .clamp(Rotation::Deg0)
            .unwrap();
        assert_eq!(area.x_end, 99);
        assert_eq!(area.y_end, 10);
        assert_eq!(area.src_stride, 31);
        assert_eq!(area.columns(), 10);
    }

    #[test]
    fn test_clamp_rotated_swaps_limits() {
        // 90°: x runs over the frame height, y over the frame width
        let area = PixelRegion::new(0, 0, 500, 500)
            .within(40, 20)
            .clamp(Rotation::Deg90)
            .unwrap();
        assert_eq!(area.x_end, 19);
        assert_eq!(area.y_end, 40);
    }

    #[test]
    fn test_clamp_end_row_is_exclusive() {
        let region = PixelRegion::new(0, 3, 9, 5).within(10, 10);
        assert_eq!(region.clamp(Rotation::Deg180).unwrap().y_end, 6);
        assert_eq!(region.clamp(Rotation::Deg180).unwrap().rows(), 3);
        assert_eq!(region.clamp(Rotation::Deg0).unwrap().rows(), 3);

        // y_end on and past the last frame row
        for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            for y_end in [9, 12] {
                let area = PixelRegion::new(0, 7, 9, y_end)
                    .within(10, 10)
                    .clamp(rotation)
                    .unwrap();
                assert_eq!(area.y_end, 10);
                assert_eq!(area.rows(), 3);
            }
        }
    }

    #[test]
    fn test_limit_to_source() {
        let region = PixelRegion::new(2, 1, 5, 4).within(10, 10);
        // 4 pixels of 2 bytes per row
        assert_eq!(region.limit_to_source(64, 2), Some(region));
        assert_eq!(
            region.limit_to_source(17, 2),
            Some(PixelRegion::new(2, 1, 5, 2).within(10, 10))
        );
        assert_eq!(region.limit_to_source(7, 2), None);
        assert_eq!(PixelRegion::new(5, 0, 4, 0).limit_to_source(64, 2), None);
    }

    #[test]
    fn test_clamp_rejects_outside() {
        assert!(PixelRegion::new(100, 0, 120, 5)
            .within(100, 10)
            .clamp(Rotation::Deg0)
            .is_none());
        assert!(PixelRegion::new(0, 0, 5, 5).clamp(Rotation::Deg0).is_none());
        assert!(PixelRegion::new(6, 0, 5, 5)
            .within(10, 10)
            .clamp(Rotation::Deg0)
            .is_none());
    }

    #[test]
    fn test_rotated_region() {
        // 4 wide x 3 tall logical region on a 10x20 frame
        let region = PixelRegion::new(1, 2, 4, 4).within(10, 20);
        assert_eq!(
            region.rotated(Rotation::Deg90).unwrap(),
            PixelRegion::new(2, 15, 4, 18).within(10, 20)
        );
        assert_eq!(
            region.rotated(Rotation::Deg180).unwrap(),
            PixelRegion::new(5, 15, 8, 17).within(10, 20)
        );
        assert_eq!(
            region.rotated(Rotation::Deg270).unwrap(),
            PixelRegion::new(5, 1, 7, 4).within(10, 20)
        );
        assert_eq!(region.rotated(Rotation::Deg0).unwrap(), region);
    }

    #[test]
    fn test_rectangle_conversion() {
        let rect = Rectangle::new(Point::new(3, 4), Size::new(5, 2));
        let region = PixelRegion::from_rectangle(&rect).unwrap();
        assert_eq!(region, PixelRegion::new(3, 4, 7, 5));
        assert_eq!(Rectangle::from(region), rect);
        assert!(PixelRegion::from_rectangle(&Rectangle::zero()).is_none());
        assert!(
            PixelRegion::from_rectangle(&Rectangle::new(Point::new(-1, 0), Size::new(2, 2)))
                .is_none()
        );
    }
}
