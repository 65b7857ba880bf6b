//! Pixel devices: canvas-sized paint devices and dab-sized scratch buffers
//!
//! Channel values are stored in the native range of the device's color
//! space (one `u16` slot per channel). All compositing reads and writes go
//! through the wide 16-bit domain, so an 8-bit device quantizes on every
//! write while a 16-bit device does not.

mod painter;
mod precise;
mod projection;

pub use painter::{CompositeOp, MirrorConfig, Painter, SelectionMask};
pub use precise::PreciseColorSource;
pub use projection::{ImageProjection, UpdateBlockGuard};

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::color::{ColorSpace, TRANSPARENT_WIDE};
use crate::errors::EngineError;
use crate::geom::Rect;

/// Shared handle to a canvas device, lockable from the paint operation and
/// the surrounding application alike
pub type SharedDevice = Arc<RwLock<PaintDevice>>;

/// Wrap a device in a shared handle
pub fn shared(device: PaintDevice) -> SharedDevice {
    Arc::new(RwLock::new(device))
}

/// A borrowed read-only view over any pixel buffer, used as the common
/// source type for painter operations
#[derive(Clone, Copy)]
pub struct PixelView<'a> {
    space: ColorSpace,
    bounds: Rect,
    data: &'a [u16],
}

impl<'a> PixelView<'a> {
    pub fn space(&self) -> ColorSpace {
        self.space
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Wide-domain pixel at canvas coordinates; transparent outside bounds
    pub fn wide_pixel(&self, x: i32, y: i32) -> [u16; 4] {
        if !self.bounds.contains_point(x, y) {
            return TRANSPARENT_WIDE;
        }
        let channels = self.space.channel_count();
        let row = (y - self.bounds.y) as usize;
        let col = (x - self.bounds.x) as usize;
        let idx = (row * self.bounds.width as usize + col) * channels;

        if channels == 1 {
            let alpha = self.space.widen(self.data[idx]);
            [0, 0, 0, alpha]
        } else {
            [
                self.space.widen(self.data[idx]),
                self.space.widen(self.data[idx + 1]),
                self.space.widen(self.data[idx + 2]),
                self.space.widen(self.data[idx + 3]),
            ]
        }
    }
}

/// A canvas-sized pixel store.
///
/// The device also carries the level-of-detail exponent of the surface it
/// represents; painting at a reduced level of detail scales every stamp by
/// `0.5^lod`.
#[derive(Debug, Clone)]
pub struct PaintDevice {
    space: ColorSpace,
    bounds: Rect,
    lod_level: u8,
    data: Vec<u16>,
}

impl PaintDevice {
    /// Create a transparent device of the given size
    pub fn new(space: ColorSpace, width: i32, height: i32) -> Result<Self, EngineError> {
        if width <= 0 || height <= 0 {
            return Err(EngineError::InvalidInput(format!(
                "device size must be positive, got {width}x{height}"
            )));
        }
        let bounds = Rect::from_size(width, height);
        let data = vec![0u16; bounds.area() * space.channel_count()];
        Ok(Self {
            space,
            bounds,
            lod_level: 0,
            data,
        })
    }

    /// Create a transparent device over an arbitrary canvas rect. An empty
    /// rect yields a device with no pixels.
    pub(crate) fn with_bounds(space: ColorSpace, bounds: Rect) -> Self {
        Self {
            space,
            bounds,
            lod_level: 0,
            data: vec![0u16; bounds.area() * space.channel_count()],
        }
    }

    /// Create a device filled with a single color
    pub fn filled(
        space: ColorSpace,
        width: i32,
        height: i32,
        color: &crate::color::Color,
    ) -> Result<Self, EngineError> {
        let mut device = Self::new(space, width, height)?;
        device.fill_wide(device.bounds, color.wide());
        Ok(device)
    }

    pub fn color_space(&self) -> ColorSpace {
        self.space
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn lod_level(&self) -> u8 {
        self.lod_level
    }

    pub fn set_lod_level(&mut self, level: u8) {
        self.lod_level = level;
    }

    /// Scale factor implied by the level of detail
    pub fn lod_scale(&self) -> f32 {
        0.5f32.powi(self.lod_level as i32)
    }

    pub fn view(&self) -> PixelView<'_> {
        PixelView {
            space: self.space,
            bounds: self.bounds,
            data: &self.data,
        }
    }

    pub(crate) fn data(&self) -> &[u16] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }

    #[inline]
    fn index_of(&self, x: i32, y: i32) -> usize {
        let row = (y - self.bounds.y) as usize;
        let col = (x - self.bounds.x) as usize;
        (row * self.bounds.width as usize + col) * self.space.channel_count()
    }

    /// Wide-domain pixel at canvas coordinates; transparent outside bounds
    pub fn wide_pixel(&self, x: i32, y: i32) -> [u16; 4] {
        self.view().wide_pixel(x, y)
    }

    /// Store a wide-domain pixel, narrowing to the device depth
    pub fn set_wide_pixel(&mut self, x: i32, y: i32, pixel: [u16; 4]) {
        if !self.bounds.contains_point(x, y) {
            return;
        }
        let idx = self.index_of(x, y);
        match self.space.channel_count() {
            1 => self.data[idx] = self.space.narrow(pixel[3]),
            _ => {
                self.data[idx] = self.space.narrow(pixel[0]);
                self.data[idx + 1] = self.space.narrow(pixel[1]);
                self.data[idx + 2] = self.space.narrow(pixel[2]);
                self.data[idx + 3] = self.space.narrow(pixel[3]);
            }
        }
    }

    /// Overwrite a rectangle with a wide-domain color (no blending)
    pub fn fill_wide(&mut self, rect: Rect, wide: [u16; 4]) {
        let rect = rect.intersected(&self.bounds);
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                self.set_wide_pixel(x, y, wide);
            }
        }
    }

    /// Raw copy (no blending) of `src_rect` from another buffer into this
    /// device at the same canvas coordinates, converting depth as needed
    pub fn copy_rect_from(&mut self, src: PixelView<'_>, src_rect: Rect) {
        let rect = src_rect.intersected(&self.bounds);
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                self.set_wide_pixel(x, y, src.wide_pixel(x, y));
            }
        }
    }

    /// Clone this device's content into another color space
    pub fn clone_in_space(&self, space: ColorSpace) -> PaintDevice {
        let mut clone = PaintDevice {
            space,
            bounds: self.bounds,
            lod_level: self.lod_level,
            data: vec![0u16; self.bounds.area() * space.channel_count()],
        };
        clone.copy_rect_from(self.view(), self.bounds);
        clone
    }

    /// Render the device into an 8-bit RGBA image
    pub fn to_image(&self) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.bounds.width as u32, self.bounds.height as u32);
        for (px, py, pixel) in img.enumerate_pixels_mut() {
            let wide = self.wide_pixel(self.bounds.x + px as i32, self.bounds.y + py as i32);
            *pixel = image::Rgba([
                (ColorSpace::Rgba8.narrow(wide[0])) as u8,
                (ColorSpace::Rgba8.narrow(wide[1])) as u8,
                (ColorSpace::Rgba8.narrow(wide[2])) as u8,
                (ColorSpace::Rgba8.narrow(wide[3])) as u8,
            ]);
        }
        img
    }

    /// Debug aid: dump the device to a PNG file
    pub fn save_png(&self, path: &Path) -> Result<(), EngineError> {
        self.to_image().save(path)?;
        tracing::debug!("device snapshot written to {:?}", path);
        Ok(())
    }
}

/// A rect-anchored scratch buffer sized to one dab.
///
/// Reused across stamps: `set_rect` repositions and `lazy_grow` resizes the
/// backing store without giving back capacity, so steady-state stamping
/// does not allocate.
#[derive(Debug, Clone)]
pub struct FixedDevice {
    space: ColorSpace,
    rect: Rect,
    data: Vec<u16>,
}

impl FixedDevice {
    pub fn new(space: ColorSpace) -> Self {
        Self {
            space,
            rect: Rect::default(),
            data: Vec::new(),
        }
    }

    pub fn color_space(&self) -> ColorSpace {
        self.space
    }

    pub fn bounds(&self) -> Rect {
        self.rect
    }

    /// Move the buffer to a new canvas rect without touching the contents
    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    /// Ensure the backing store covers the current rect. Newly exposed
    /// slots are zeroed; existing capacity is kept.
    pub fn lazy_grow(&mut self) {
        let needed = self.rect.area() * self.space.channel_count();
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
    }

    pub fn view(&self) -> PixelView<'_> {
        PixelView {
            space: self.space,
            bounds: self.rect,
            data: &self.data,
        }
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }

    pub fn wide_pixel(&self, x: i32, y: i32) -> [u16; 4] {
        self.view().wide_pixel(x, y)
    }

    pub fn set_wide_pixel(&mut self, x: i32, y: i32, pixel: [u16; 4]) {
        if !self.rect.contains_point(x, y) {
            return;
        }
        let channels = self.space.channel_count();
        let row = (y - self.rect.y) as usize;
        let col = (x - self.rect.x) as usize;
        let idx = (row * self.rect.width as usize + col) * channels;
        if channels == 1 {
            self.data[idx] = self.space.narrow(pixel[3]);
        } else {
            self.data[idx] = self.space.narrow(pixel[0]);
            self.data[idx + 1] = self.space.narrow(pixel[1]);
            self.data[idx + 2] = self.space.narrow(pixel[2]);
            self.data[idx + 3] = self.space.narrow(pixel[3]);
        }
    }

    /// Reposition over `rect` and fill with a raw copy of the source view
    /// at the same canvas coordinates (transparent where the source has no
    /// pixels)
    pub fn read_from(&mut self, src: PixelView<'_>, rect: Rect) {
        self.set_rect(rect);
        self.lazy_grow();
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                self.set_wide_pixel(x, y, src.wide_pixel(x, y));
            }
        }
    }

    /// Copy the opacity channel of `src` into this single-channel mask.
    /// Both buffers must already have identical bounds.
    pub fn copy_opacity_from(&mut self, src: &FixedDevice) {
        debug_assert_eq!(self.rect.size(), src.bounds().size());
        debug_assert_eq!(self.space.channel_count(), 1);
        let rect = self.rect;
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                let alpha = src.wide_pixel(x - rect.x + src.bounds().x, y - rect.y + src.bounds().y)[3];
                self.set_wide_pixel(x, y, [0, 0, 0, alpha]);
            }
        }
    }

    /// A copy flipped about the rect's own horizontal and/or vertical
    /// center line, keeping the same bounds
    pub fn flipped(&self, horizontal: bool, vertical: bool) -> FixedDevice {
        let mut out = self.clone();
        if !horizontal && !vertical {
            return out;
        }
        let rect = self.rect;
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                let sx = if horizontal {
                    rect.right() - 1 - (x - rect.left())
                } else {
                    x
                };
                let sy = if vertical {
                    rect.bottom() - 1 - (y - rect.top())
                } else {
                    y
                };
                out.set_wide_pixel(x, y, self.wide_pixel(sx, sy));
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn test_device_rejects_degenerate_size() {
        assert!(PaintDevice::new(ColorSpace::Rgba8, 0, 10).is_err());
        assert!(PaintDevice::new(ColorSpace::Rgba8, 10, -1).is_err());
    }

    #[test]
    fn test_pixel_roundtrip_quantizes_on_u8() {
        let mut device = PaintDevice::new(ColorSpace::Rgba8, 4, 4).unwrap();
        device.set_wide_pixel(1, 1, [300, 0, 0, 65535]);
        // 300 wide rounds to one u8 step
        assert_eq!(device.wide_pixel(1, 1)[0], 257);

        let mut precise = PaintDevice::new(ColorSpace::Rgba16, 4, 4).unwrap();
        precise.set_wide_pixel(1, 1, [300, 0, 0, 65535]);
        assert_eq!(precise.wide_pixel(1, 1)[0], 300);
    }

    #[test]
    fn test_out_of_bounds_reads_are_transparent() {
        let device = PaintDevice::new(ColorSpace::Rgba8, 4, 4).unwrap();
        assert_eq!(device.wide_pixel(-1, 0), crate::color::TRANSPARENT_WIDE);
        assert_eq!(device.wide_pixel(4, 4), crate::color::TRANSPARENT_WIDE);
    }

    #[test]
    fn test_clone_in_space_widens() {
        let red = Color::from_rgba8([200, 10, 0, 255]);
        let device = PaintDevice::filled(ColorSpace::Rgba8, 3, 3, &red).unwrap();
        let precise = device.clone_in_space(ColorSpace::Rgba16);
        assert_eq!(precise.wide_pixel(0, 0), device.wide_pixel(0, 0));
        assert_eq!(precise.wide_pixel(2, 2)[0], 200 * 257);
    }

    #[test]
    fn test_fixed_device_keeps_capacity() {
        let mut dab = FixedDevice::new(ColorSpace::Rgba16);
        dab.set_rect(Rect::new(0, 0, 32, 32));
        dab.lazy_grow();
        let cap = dab.data.capacity();

        dab.set_rect(Rect::new(100, 100, 16, 16));
        dab.lazy_grow();
        assert_eq!(dab.data.capacity(), cap);
    }

    #[test]
    fn test_copy_opacity() {
        let mut dab = FixedDevice::new(ColorSpace::Rgba16);
        dab.set_rect(Rect::new(10, 10, 2, 2));
        dab.lazy_grow();
        dab.set_wide_pixel(10, 10, [100, 200, 300, 40000]);

        let mut mask = FixedDevice::new(ColorSpace::Alpha8);
        mask.set_rect(dab.bounds());
        mask.lazy_grow();
        mask.copy_opacity_from(&dab);

        let expected = ColorSpace::Alpha8.widen(ColorSpace::Alpha8.narrow(40000));
        assert_eq!(mask.wide_pixel(10, 10)[3], expected);
        assert_eq!(mask.wide_pixel(11, 11)[3], 0);
    }

    #[test]
    fn test_flipped() {
        let mut dab = FixedDevice::new(ColorSpace::Rgba16);
        dab.set_rect(Rect::new(0, 0, 2, 1));
        dab.lazy_grow();
        dab.set_wide_pixel(0, 0, [1, 0, 0, 65535]);
        dab.set_wide_pixel(1, 0, [2, 0, 0, 65535]);

        let flipped = dab.flipped(true, false);
        assert_eq!(flipped.wide_pixel(0, 0)[0], 2);
        assert_eq!(flipped.wide_pixel(1, 0)[0], 1);
    }

    #[test]
    fn test_lod_scale() {
        let mut device = PaintDevice::new(ColorSpace::Rgba8, 4, 4).unwrap();
        assert_eq!(device.lod_scale(), 1.0);
        device.set_lod_level(2);
        assert_eq!(device.lod_scale(), 0.25);
    }

    #[test]
    fn test_to_image() {
        let color = Color::from_rgba8([12, 34, 56, 78]);
        let device = PaintDevice::filled(ColorSpace::Rgba8, 2, 2, &color).unwrap();
        let img = device.to_image();
        assert_eq!(img.get_pixel(0, 0).0, [12, 34, 56, 78]);
    }
}
