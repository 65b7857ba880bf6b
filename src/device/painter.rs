//! Compositing painter: blits, fills and masked blits over paint devices
//!
//! A painter carries the blend configuration (composite op, opacity,
//! selection, mirroring) and records every rectangle it touches so the
//! caller can collect dirty regions for display refresh.

use serde::{Deserialize, Serialize};

use super::{FixedDevice, PaintDevice, PixelView};
use crate::color::Color;
use crate::geom::{PointF, Rect};

/// Composite modes used by the smudge pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeOp {
    /// Interpolate destination toward source by the effective opacity,
    /// alpha channel included
    Copy,
    /// Standard straight-alpha "over" compositing
    #[default]
    Over,
}

impl CompositeOp {
    /// Blend one wide-domain pixel. `factor` (0..=65535) folds together
    /// painter opacity and any mask coverage.
    #[inline]
    pub fn blend(&self, dst: [u16; 4], src: [u16; 4], factor: u32) -> [u16; 4] {
        if factor == 0 {
            return dst;
        }
        let f = factor as f32 / 65535.0;
        match self {
            CompositeOp::Copy => {
                let lerp = |d: u16, s: u16| -> u16 {
                    let d = d as f32;
                    (d + (s as f32 - d) * f).round().clamp(0.0, 65535.0) as u16
                };
                [
                    lerp(dst[0], src[0]),
                    lerp(dst[1], src[1]),
                    lerp(dst[2], src[2]),
                    lerp(dst[3], src[3]),
                ]
            }
            CompositeOp::Over => {
                let sa = src[3] as f32 / 65535.0 * f;
                if sa <= 0.0 {
                    return dst;
                }
                let da = dst[3] as f32 / 65535.0;
                let out_a = sa + da * (1.0 - sa);
                if out_a <= 0.0 {
                    return [0, 0, 0, 0];
                }
                let channel = |s: u16, d: u16| -> u16 {
                    let s = s as f32 / 65535.0;
                    let d = d as f32 / 65535.0;
                    let c = (s * sa + d * da * (1.0 - sa)) / out_a;
                    (c * 65535.0).round().clamp(0.0, 65535.0) as u16
                };
                [
                    channel(src[0], dst[0]),
                    channel(src[1], dst[1]),
                    channel(src[2], dst[2]),
                    (out_a * 65535.0).round().clamp(0.0, 65535.0) as u16,
                ]
            }
        }
    }
}

/// Canvas-space selection coverage. Pixels outside the mask bounds are
/// unselected.
#[derive(Debug, Clone)]
pub struct SelectionMask {
    bounds: Rect,
    data: Vec<u8>,
}

impl SelectionMask {
    pub fn new(bounds: Rect, data: Vec<u8>) -> Self {
        debug_assert_eq!(bounds.area(), data.len());
        Self { bounds, data }
    }

    /// A uniformly selected rectangle
    pub fn filled(bounds: Rect, coverage: u8) -> Self {
        Self {
            bounds,
            data: vec![coverage; bounds.area()],
        }
    }

    pub fn coverage(&self, x: i32, y: i32) -> u8 {
        if !self.bounds.contains_point(x, y) {
            return 0;
        }
        let row = (y - self.bounds.y) as usize;
        let col = (x - self.bounds.x) as usize;
        self.data[row * self.bounds.width as usize + col]
    }
}

/// Mirrored-painting configuration: reflection about a vertical and/or
/// horizontal axis through `center`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MirrorConfig {
    pub horizontal: bool,
    pub vertical: bool,
    pub center: PointF,
}

impl MirrorConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn about(center: PointF, horizontal: bool, vertical: bool) -> Self {
        Self {
            horizontal,
            vertical,
            center,
        }
    }

    pub fn is_active(&self) -> bool {
        self.horizontal || self.vertical
    }

    /// Reflect a rect about the configured axes. `h`/`v` select which
    /// reflections to apply.
    pub fn mirrored_rect(&self, rect: Rect, h: bool, v: bool) -> Rect {
        let mut out = rect;
        if h {
            let axis_x2 = (2.0 * self.center.x).round() as i32;
            out.x = axis_x2 - out.x - out.width;
        }
        if v {
            let axis_y2 = (2.0 * self.center.y).round() as i32;
            out.y = axis_y2 - out.y - out.height;
        }
        out
    }

    /// The enabled (h, v) reflection combinations, identity excluded
    fn combinations(&self) -> Vec<(bool, bool)> {
        let mut combos = Vec::with_capacity(3);
        if self.horizontal {
            combos.push((true, false));
        }
        if self.vertical {
            combos.push((false, true));
        }
        if self.horizontal && self.vertical {
            combos.push((true, true));
        }
        combos
    }
}

/// A stateful compositing painter over `PaintDevice` targets
#[derive(Debug, Clone)]
pub struct Painter {
    composite_op: CompositeOp,
    opacity: u8,
    selection: Option<SelectionMask>,
    mirror: MirrorConfig,
    dirty: Vec<Rect>,
}

impl Default for Painter {
    fn default() -> Self {
        Self::new(CompositeOp::Over)
    }
}

impl Painter {
    pub fn new(composite_op: CompositeOp) -> Self {
        Self {
            composite_op,
            opacity: 255,
            selection: None,
            mirror: MirrorConfig::none(),
            dirty: Vec::new(),
        }
    }

    pub fn composite_op(&self) -> CompositeOp {
        self.composite_op
    }

    pub fn set_composite_op(&mut self, op: CompositeOp) {
        self.composite_op = op;
    }

    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }

    pub fn set_selection(&mut self, selection: Option<SelectionMask>) {
        self.selection = selection;
    }

    pub fn set_mirror(&mut self, mirror: MirrorConfig) {
        self.mirror = mirror;
    }

    pub fn mirror(&self) -> MirrorConfig {
        self.mirror
    }

    /// Adopt another painter's mirror configuration
    pub fn copy_mirror_information_from(&mut self, other: &Painter) {
        self.mirror = other.mirror;
    }

    /// Rects painting into `rect` will touch, the rect itself included
    pub fn calculate_all_mirrored_rects(&self, rect: Rect) -> Vec<Rect> {
        let mut rects = vec![rect];
        for (h, v) in self.mirror.combinations() {
            rects.push(self.mirror.mirrored_rect(rect, h, v));
        }
        rects
    }

    /// Take and reset the accumulated dirty region
    pub fn take_dirty_region(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.dirty)
    }

    #[inline]
    fn selection_factor(&self, x: i32, y: i32) -> u32 {
        match &self.selection {
            None => 65535,
            Some(mask) => mask.coverage(x, y) as u32 * 257,
        }
    }

    /// Composite `src_rect` of the source onto `dst` with its top-left at
    /// `dst_point`
    pub fn bit_blt(
        &mut self,
        dst: &mut PaintDevice,
        dst_point: (i32, i32),
        src: PixelView<'_>,
        src_rect: Rect,
    ) {
        if src_rect.is_empty() {
            return;
        }
        let opacity = self.opacity as u32 * 257;
        let dst_rect = Rect::new(dst_point.0, dst_point.1, src_rect.width, src_rect.height);
        let clipped = dst_rect.intersected(&dst.bounds());
        if clipped.is_empty() {
            return;
        }

        let dx = src_rect.x - dst_rect.x;
        let dy = src_rect.y - dst_rect.y;
        for y in clipped.top()..clipped.bottom() {
            for x in clipped.left()..clipped.right() {
                let factor = opacity * self.selection_factor(x, y) / 65535;
                if factor == 0 {
                    continue;
                }
                let src_px = src.wide_pixel(x + dx, y + dy);
                let out = self
                    .composite_op
                    .blend(dst.wide_pixel(x, y), src_px, factor);
                dst.set_wide_pixel(x, y, out);
            }
        }
        self.dirty.push(clipped);
    }

    /// Composite a whole fixed device onto `dst` at `dst_point`
    pub fn blt_fixed(&mut self, dst: &mut PaintDevice, dst_point: (i32, i32), src: &FixedDevice) {
        self.bit_blt(dst, dst_point, src.view(), src.bounds());
    }

    /// Composite a solid color over a rectangle
    pub fn fill(&mut self, dst: &mut PaintDevice, rect: Rect, color: &Color) {
        let clipped = rect.intersected(&dst.bounds());
        if clipped.is_empty() {
            return;
        }
        let opacity = self.opacity as u32 * 257;
        let src_px = color.wide();
        for y in clipped.top()..clipped.bottom() {
            for x in clipped.left()..clipped.right() {
                let factor = opacity * self.selection_factor(x, y) / 65535;
                if factor == 0 {
                    continue;
                }
                let out = self
                    .composite_op
                    .blend(dst.wide_pixel(x, y), src_px, factor);
                dst.set_wide_pixel(x, y, out);
            }
        }
        self.dirty.push(clipped);
    }

    /// Composite `rect` of the source onto `dst` at the same canvas
    /// coordinates, additionally weighted by a dab-shaped alpha mask whose
    /// bounds match `rect`
    pub fn bit_blt_with_fixed_selection(
        &mut self,
        dst: &mut PaintDevice,
        src: PixelView<'_>,
        rect: Rect,
        mask: &FixedDevice,
    ) {
        debug_assert_eq!(rect.size(), mask.bounds().size());
        let clipped = rect.intersected(&dst.bounds());
        if clipped.is_empty() {
            return;
        }
        let opacity = self.opacity as u32 * 257;
        let mask_dx = mask.bounds().x - rect.x;
        let mask_dy = mask.bounds().y - rect.y;
        for y in clipped.top()..clipped.bottom() {
            for x in clipped.left()..clipped.right() {
                let mask_a = mask.wide_pixel(x + mask_dx, y + mask_dy)[3] as u32;
                if mask_a == 0 {
                    continue;
                }
                let factor =
                    opacity * self.selection_factor(x, y) / 65535 * mask_a / 65535;
                if factor == 0 {
                    continue;
                }
                let out = self
                    .composite_op
                    .blend(dst.wide_pixel(x, y), src.wide_pixel(x, y), factor);
                dst.set_wide_pixel(x, y, out);
            }
        }
        self.dirty.push(clipped);
    }

    /// Render the mirrored counterparts of a masked dab blit. The source
    /// content and the mask are flipped about the dab's own center before
    /// being composited at each reflected rect.
    pub fn render_mirror_mask(
        &mut self,
        dst: &mut PaintDevice,
        rect: Rect,
        src: PixelView<'_>,
        mask: &FixedDevice,
    ) {
        if !self.mirror.is_active() {
            return;
        }
        let mut content = FixedDevice::new(src.space());
        content.read_from(src, rect);

        for (h, v) in self.mirror.combinations() {
            let target = self.mirror.mirrored_rect(rect, h, v);
            let mut flipped = content.flipped(h, v);
            flipped.set_rect(target);
            let mut flipped_mask = mask.flipped(h, v);
            flipped_mask.set_rect(target);
            self.bit_blt_with_fixed_selection(dst, flipped.view(), target, &flipped_mask);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::ColorSpace;

    fn solid_device(color: [u8; 4], size: i32) -> PaintDevice {
        PaintDevice::filled(
            ColorSpace::Rgba16,
            size,
            size,
            &Color::from_rgba8(color),
        )
        .unwrap()
    }

    #[test]
    fn test_copy_blend_full_factor_replaces() {
        let out = CompositeOp::Copy.blend([0, 0, 0, 0], [100, 200, 300, 65535], 65535);
        assert_eq!(out, [100, 200, 300, 65535]);
    }

    #[test]
    fn test_copy_blend_half_factor_lerps() {
        let out = CompositeOp::Copy.blend([0, 0, 0, 0], [20000, 0, 0, 65535], 32768);
        assert!((out[0] as i32 - 10000).abs() <= 2);
        assert!((out[3] as i32 - 32768).abs() <= 2);
    }

    #[test]
    fn test_over_blend_opaque_src_wins() {
        let out = CompositeOp::Over.blend([0, 65535, 0, 65535], [65535, 0, 0, 65535], 65535);
        assert_eq!(out, [65535, 0, 0, 65535]);
    }

    #[test]
    fn test_over_blend_zero_alpha_is_noop() {
        let dst = [123, 456, 789, 40000];
        assert_eq!(CompositeOp::Over.blend(dst, [9, 9, 9, 0], 65535), dst);
        assert_eq!(CompositeOp::Over.blend(dst, [9, 9, 9, 65535], 0), dst);
    }

    #[test]
    fn test_bit_blt_records_dirty_rect() {
        let src = solid_device([255, 0, 0, 255], 8);
        let mut dst = solid_device([0, 0, 255, 255], 8);
        let mut painter = Painter::new(CompositeOp::Copy);

        painter.bit_blt(&mut dst, (2, 2), src.view(), Rect::new(0, 0, 4, 4));
        assert_eq!(painter.take_dirty_region(), vec![Rect::new(2, 2, 4, 4)]);
        assert!(painter.take_dirty_region().is_empty());

        assert_eq!(dst.wide_pixel(2, 2)[0], 65535);
        assert_eq!(dst.wide_pixel(0, 0)[2], 65535);
    }

    #[test]
    fn test_blit_clips_to_destination() {
        let src = solid_device([255, 255, 255, 255], 8);
        let mut dst = solid_device([0, 0, 0, 255], 4);
        let mut painter = Painter::new(CompositeOp::Copy);

        painter.bit_blt(&mut dst, (2, 2), src.view(), Rect::new(0, 0, 8, 8));
        assert_eq!(painter.take_dirty_region(), vec![Rect::new(2, 2, 2, 2)]);
    }

    #[test]
    fn test_selection_gates_painting() {
        let src = solid_device([255, 0, 0, 255], 4);
        let mut dst = solid_device([0, 0, 0, 255], 4);
        let mut painter = Painter::new(CompositeOp::Copy);
        painter.set_selection(Some(SelectionMask::filled(Rect::new(0, 0, 2, 4), 255)));

        painter.bit_blt(&mut dst, (0, 0), src.view(), Rect::new(0, 0, 4, 4));
        assert_eq!(dst.wide_pixel(1, 1)[0], 65535);
        // Outside the selection nothing changes
        assert_eq!(dst.wide_pixel(3, 1)[0], 0);
    }

    #[test]
    fn test_fixed_selection_masks_blit() {
        let src = solid_device([255, 0, 0, 255], 4);
        let mut dst = solid_device([0, 0, 0, 255], 4);
        let mut painter = Painter::new(CompositeOp::Copy);

        let rect = Rect::new(0, 0, 2, 2);
        let mut mask = FixedDevice::new(ColorSpace::Alpha8);
        mask.set_rect(rect);
        mask.lazy_grow();
        mask.set_wide_pixel(0, 0, [0, 0, 0, 65535]);

        painter.bit_blt_with_fixed_selection(&mut dst, src.view(), rect, &mask);
        assert_eq!(dst.wide_pixel(0, 0)[0], 65535);
        assert_eq!(dst.wide_pixel(1, 1)[0], 0);
    }

    #[test]
    fn test_mirrored_rects() {
        let mut painter = Painter::new(CompositeOp::Copy);
        let rect = Rect::new(1, 1, 2, 2);

        assert_eq!(painter.calculate_all_mirrored_rects(rect).len(), 1);

        painter.set_mirror(MirrorConfig::about(PointF::new(4.0, 4.0), true, true));
        let rects = painter.calculate_all_mirrored_rects(rect);
        assert_eq!(rects.len(), 4);
        assert!(rects.contains(&Rect::new(5, 1, 2, 2)));
        assert!(rects.contains(&Rect::new(1, 5, 2, 2)));
        assert!(rects.contains(&Rect::new(5, 5, 2, 2)));
    }

    #[test]
    fn test_render_mirror_mask_paints_reflection() {
        let src = solid_device([0, 255, 0, 255], 8);
        let mut dst = solid_device([0, 0, 0, 255], 8);
        let mut painter = Painter::new(CompositeOp::Copy);
        painter.set_mirror(MirrorConfig::about(PointF::new(4.0, 4.0), true, false));

        let rect = Rect::new(0, 0, 2, 2);
        let mut mask = FixedDevice::new(ColorSpace::Alpha8);
        mask.set_rect(rect);
        mask.lazy_grow();
        for y in 0..2 {
            for x in 0..2 {
                mask.set_wide_pixel(x, y, [0, 0, 0, 65535]);
            }
        }

        painter.render_mirror_mask(&mut dst, rect, src.view(), &mask);
        // Reflected copy lands at x in 6..8
        assert_eq!(dst.wide_pixel(6, 0)[1], 65535);
        assert_eq!(dst.wide_pixel(0, 0)[1], 0);
    }
}
