//! Per-stamp compositing for the smudge operation
//!
//! The strategy owns the buffers a stroke reuses stamp after stamp: the
//! alpha mask and color dab of the current stamp, a dab-sized scratch
//! buffer, and the stroke-long 16-bit color buffer all smearing and color
//! mixing happens in. The canvas itself is only touched by the final
//! masked blit, which the operation drives.

use crate::brush::Brush;
use crate::color::{Color, ColorSpace};
use crate::device::{
    CompositeOp, FixedDevice, ImageProjection, PaintDevice, Painter, PreciseColorSource,
};
use crate::geom::{PointF, Rect};
use crate::paint::options::SmudgeMode;
use crate::paint::{DabShape, PaintInformation};

/// Compositing configuration resolved once at stroke start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyConfig {
    pub mode: SmudgeMode,
    /// Smear from the composited image projection instead of the layer
    pub overlay: bool,
    pub color_rate_enabled: bool,
    /// Copy the alpha channel verbatim instead of blending it
    pub smear_alpha: bool,
}

/// `round(rate² · opacity · 255)` — squaring is deliberate perceptual
/// weighting, low color rates have proportionally less effect
pub(crate) fn color_alpha(color_rate: f32, opacity: f32) -> u8 {
    (color_rate * color_rate * opacity * 255.0)
        .round()
        .clamp(0.0, 255.0) as u8
}

pub(crate) fn smear_alpha(smudge_rate: f32, opacity: f32) -> u8 {
    (smudge_rate * opacity * 255.0).round().clamp(0.0, 255.0) as u8
}

pub(crate) fn dulling_alpha(smudge_rate: f32, opacity: f32) -> u8 {
    (smudge_rate * 0.8 * opacity * 255.0)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// The pixel-level smudge compositor for one stroke
pub struct SmudgeStrategy {
    config: StrategyConfig,
    mask_dab: FixedDevice,
    orig_dab: FixedDevice,
    scratch: FixedDevice,
    color_device: PaintDevice,
    smear_painter: Painter,
    overlay_painter: Painter,
    color_rate_painter: Painter,
}

impl SmudgeStrategy {
    /// Set up the stroke's buffers. The color buffer starts as a 16-bit
    /// clone of the canvas so repeated smearing never re-rounds through
    /// 8-bit storage.
    pub fn new(config: StrategyConfig, canvas: &PaintDevice, color_rate_op: CompositeOp) -> Self {
        let smear_op = if config.smear_alpha {
            CompositeOp::Copy
        } else {
            CompositeOp::Over
        };
        Self {
            config,
            mask_dab: FixedDevice::new(ColorSpace::Alpha8),
            orig_dab: FixedDevice::new(ColorSpace::Rgba16),
            scratch: FixedDevice::new(ColorSpace::Rgba16),
            color_device: canvas.clone_in_space(ColorSpace::Rgba16),
            smear_painter: Painter::new(smear_op),
            overlay_painter: Painter::new(CompositeOp::Over),
            color_rate_painter: Painter::new(color_rate_op),
        }
    }

    pub fn config(&self) -> StrategyConfig {
        self.config
    }

    /// The destination buffer never needs pre-clearing: the smear (or
    /// dulling fill) step covers the whole dab rect.
    pub fn needs_dst_initialized(&self) -> bool {
        false
    }

    /// The alpha mask used as the fixed selection for the final blit
    pub fn final_selection_device(&self) -> &FixedDevice {
        &self.mask_dab
    }

    /// The stroke's accumulated color buffer, source of the final blit
    pub fn color_device(&self) -> &PaintDevice {
        &self.color_device
    }

    /// Fetch the color dab for this stamp and derive its alpha mask.
    /// Returns the destination rect the dab occupies.
    #[allow(clippy::too_many_arguments)]
    pub fn update_mask(
        &mut self,
        brush: &dyn Brush,
        info: &PaintInformation,
        shape: &DabShape,
        cursor: PointF,
        color: &Color,
        lightness_strength: f32,
        subpixel: bool,
    ) -> Rect {
        let dst_rect = brush.fetch_dab(
            ColorSpace::Rgba16,
            color,
            cursor,
            shape,
            info,
            lightness_strength,
            subpixel,
            &mut self.orig_dab,
        );

        self.mask_dab.set_rect(self.orig_dab.bounds());
        self.mask_dab.lazy_grow();
        self.mask_dab.copy_opacity_from(&self.orig_dab);

        debug_assert_eq!(dst_rect.size(), self.mask_dab.bounds().size());
        dst_rect
    }

    /// Run the smear / dulling / color-rate math for one stamp inside the
    /// color buffer. `src_rect` is the read region, offset from `dst_rect`
    /// by the motion since the previous stamp. The dulling fill color, if
    /// dulling applies, was sampled by the caller per the radius option.
    #[allow(clippy::too_many_arguments)]
    pub fn paint_dab(
        &mut self,
        wrapper: &mut PreciseColorSource,
        projection: Option<&ImageProjection>,
        src_rect: Rect,
        dst_rect: Rect,
        _sample_point: (i32, i32),
        opacity: f32,
        color_rate: f32,
        smudge_rate: f32,
        _lightness_strength: f32,
        dab_color: &Color,
        dulling_color: Option<&Color>,
    ) {
        let color_alpha = color_alpha(color_rate, opacity);
        let smear_alpha = smear_alpha(smudge_rate, opacity);
        let dulling_alpha = dulling_alpha(smudge_rate, opacity);

        wrapper.read_rect(src_rect);

        let overlay = self.config.overlay.then_some(projection).flatten();
        if let Some(projection) = overlay {
            // Snapshot the projection under an update block so a
            // recomposition mid-read cannot tear the source pixels.
            {
                let _updates_blocked = projection.block_updates();
                let device = projection.read();
                self.scratch.read_from(device.view(), src_rect);
            }
            self.smear_painter.set_opacity(smear_alpha);
            self.smear_painter
                .bit_blt(&mut self.color_device, dst_rect.top_left(), self.scratch.view(), src_rect);

            // The projection lags the layer by up to a frame; compose the
            // layer's precise content over the snapshot to catch up.
            self.scratch
                .read_from(wrapper.precise_device().view(), src_rect);
            self.overlay_painter.set_opacity(smear_alpha);
            self.overlay_painter
                .bit_blt(&mut self.color_device, dst_rect.top_left(), self.scratch.view(), src_rect);

            if self.config.mode == SmudgeMode::Dulling {
                self.fill_dulling(dst_rect, dulling_alpha, dab_color, dulling_color);
            }
        } else {
            match self.config.mode {
                SmudgeMode::Smearing => {
                    self.scratch.read_from(self.color_device.view(), src_rect);
                    self.smear_painter.set_opacity(smear_alpha);
                    self.smear_painter.bit_blt(
                        &mut self.color_device,
                        dst_rect.top_left(),
                        self.scratch.view(),
                        src_rect,
                    );
                }
                SmudgeMode::Dulling => {
                    self.fill_dulling(dst_rect, dulling_alpha, dab_color, dulling_color);
                }
            }
        }

        if self.config.color_rate_enabled {
            self.color_rate_painter.set_opacity(color_alpha);
            self.color_rate_painter
                .fill(&mut self.color_device, dst_rect, dab_color);
        }

        // The color buffer's dirty state is internal; only the final blit
        // produces canvas dirty rects.
        self.smear_painter.take_dirty_region();
        self.overlay_painter.take_dirty_region();
        self.color_rate_painter.take_dirty_region();
    }

    fn fill_dulling(
        &mut self,
        dst_rect: Rect,
        dulling_alpha: u8,
        dab_color: &Color,
        dulling_color: Option<&Color>,
    ) {
        debug_assert!(dulling_color.is_some());
        let fill = dulling_color.unwrap_or(dab_color);
        self.smear_painter.set_opacity(dulling_alpha);
        self.smear_painter.fill(&mut self.color_device, dst_rect, fill);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::brush::SoftEllipseTip;
    use crate::color::Color;
    use crate::device::{shared, PaintDevice};
    use crate::geom::PointF;

    fn smearing_config() -> StrategyConfig {
        StrategyConfig {
            mode: SmudgeMode::Smearing,
            overlay: false,
            color_rate_enabled: false,
            smear_alpha: true,
        }
    }

    fn canvas(color: [u8; 4]) -> PaintDevice {
        PaintDevice::filled(ColorSpace::Rgba8, 32, 32, &Color::from_rgba8(color)).unwrap()
    }

    #[test]
    fn test_alpha_formulas() {
        assert_eq!(color_alpha(0.0, 1.0), 0);
        assert_eq!(color_alpha(1.0, 1.0), 255);
        // Squared weighting: half rate lands at a quarter strength
        assert_eq!(color_alpha(0.5, 1.0), 64);

        assert_eq!(smear_alpha(1.0, 1.0), 255);
        assert_eq!(smear_alpha(0.5, 0.5), 64);

        assert_eq!(dulling_alpha(1.0, 1.0), 204);
    }

    #[test]
    fn test_alpha_formulas_stay_in_range() {
        for rate in [0.0f32, 0.1, 0.33, 0.5, 0.99, 1.0] {
            for opacity in [0.0f32, 0.25, 0.75, 1.0] {
                // u8 output by construction; the clamp guards rounding
                let _ = color_alpha(rate, opacity);
                let _ = smear_alpha(rate, opacity);
                let _ = dulling_alpha(rate, opacity);
            }
        }
        // Defensive clamping for out-of-contract inputs
        assert_eq!(smear_alpha(2.0, 2.0), 255);
        assert_eq!(color_alpha(-1.0, 1.0), 255);
    }

    #[test]
    fn test_update_mask_postcondition() {
        let mut strategy =
            SmudgeStrategy::new(smearing_config(), &canvas([0, 0, 0, 255]), CompositeOp::Over);
        let tip = SoftEllipseTip::new(8.0, 1.0);
        let info = PaintInformation::new(16.0, 16.0, 1.0);
        let shape = DabShape::new(1.0, 1.0, 0.0);
        let color = Color::from_rgba8([255, 0, 0, 255]);

        let dst_rect =
            strategy.update_mask(&tip, &info, &shape, PointF::new(16.0, 16.0), &color, 1.0, true);

        assert_eq!(dst_rect.size(), strategy.final_selection_device().bounds().size());
        // Mask alpha mirrors the dab opacity at the center
        let center = dst_rect.center().rounded();
        let dab_alpha = strategy.orig_dab.wide_pixel(center.0, center.1)[3];
        let mask_alpha = strategy.final_selection_device().wide_pixel(center.0, center.1)[3];
        assert!((dab_alpha as i32 - mask_alpha as i32).abs() < 300);
        assert!(mask_alpha > 60000);
    }

    #[test]
    fn test_smear_moves_content() {
        // Left half red, right half blue
        let mut device = canvas([0, 0, 255, 255]);
        let red = Color::from_rgba8([255, 0, 0, 255]);
        device.fill_wide(Rect::new(0, 0, 16, 32), red.wide());

        let shared_canvas = shared(device.clone());
        let mut wrapper = PreciseColorSource::new(shared_canvas);
        let mut strategy = SmudgeStrategy::new(smearing_config(), &device, CompositeOp::Over);

        let src_rect = Rect::new(4, 12, 8, 8); // fully in the red half
        let dst_rect = Rect::new(20, 12, 8, 8); // in the blue half
        let color = Color::from_rgba8([0, 255, 0, 255]);
        strategy.paint_dab(
            &mut wrapper,
            None,
            src_rect,
            dst_rect,
            (8, 16),
            1.0,
            0.0,
            1.0,
            1.0,
            &color,
            None,
        );

        // Full-rate smear with copy alpha: destination region now carries
        // the red source content
        assert_eq!(strategy.color_device().wide_pixel(22, 14)[0], 65535);
        assert_eq!(strategy.color_device().wide_pixel(22, 14)[2], 0);
        // Outside the dab the buffer still holds the canvas content
        assert_eq!(strategy.color_device().wide_pixel(30, 30)[2], 65535);
    }

    #[test]
    fn test_zero_smudge_rate_leaves_buffer() {
        let device = canvas([10, 20, 30, 255]);
        let shared_canvas = shared(device.clone());
        let mut wrapper = PreciseColorSource::new(shared_canvas);
        let mut strategy = SmudgeStrategy::new(smearing_config(), &device, CompositeOp::Over);

        let before = strategy.color_device().wide_pixel(20, 12);
        let color = Color::from_rgba8([255, 255, 255, 255]);
        strategy.paint_dab(
            &mut wrapper,
            None,
            Rect::new(4, 4, 8, 8),
            Rect::new(18, 10, 8, 8),
            (8, 8),
            1.0,
            0.0,
            0.0,
            1.0,
            &color,
            None,
        );
        assert_eq!(strategy.color_device().wide_pixel(20, 12), before);
    }

    #[test]
    fn test_dulling_fills_with_sampled_color() {
        let device = canvas([0, 0, 255, 255]);
        let shared_canvas = shared(device.clone());
        let mut wrapper = PreciseColorSource::new(shared_canvas);
        let config = StrategyConfig {
            mode: SmudgeMode::Dulling,
            ..smearing_config()
        };
        let mut strategy = SmudgeStrategy::new(config, &device, CompositeOp::Over);

        let dulling = Color::from_rgba8([255, 255, 0, 255]).convert_to(ColorSpace::Rgba16);
        let dab_color = Color::from_rgba8([0, 255, 0, 255]);
        let dst_rect = Rect::new(8, 8, 8, 8);
        strategy.paint_dab(
            &mut wrapper,
            None,
            Rect::new(6, 8, 8, 8),
            dst_rect,
            (10, 12),
            1.0,
            0.0,
            1.0,
            1.0,
            &dab_color,
            Some(&dulling),
        );

        // Dulling at rate 1.0 runs at 0.8 strength: the fill is mixed in
        // but the canvas blue still shows through
        let px = strategy.color_device().wide_pixel(10, 10);
        assert!(px[0] > 40000);
        assert!(px[2] > 8000 && px[2] < 30000);
    }

    #[test]
    fn test_color_rate_fill() {
        let device = canvas([0, 0, 0, 255]);
        let shared_canvas = shared(device.clone());
        let mut wrapper = PreciseColorSource::new(shared_canvas);
        let config = StrategyConfig {
            color_rate_enabled: true,
            ..smearing_config()
        };
        let mut strategy = SmudgeStrategy::new(config, &device, CompositeOp::Over);

        let dab_color = Color::from_rgba8([255, 0, 0, 255]);
        let dst_rect = Rect::new(8, 8, 8, 8);
        strategy.paint_dab(
            &mut wrapper,
            None,
            dst_rect,
            dst_rect,
            (12, 12),
            1.0,
            1.0, // full color rate
            0.0, // no smearing
            1.0,
            &dab_color,
            None,
        );

        assert_eq!(strategy.color_device().wide_pixel(10, 10)[0], 65535);
    }

    #[test]
    fn test_needs_no_dst_initialization() {
        let strategy =
            SmudgeStrategy::new(smearing_config(), &canvas([0, 0, 0, 255]), CompositeOp::Over);
        assert!(!strategy.needs_dst_initialized());
    }
}
