//! Stroke-level state machine of the color-smudge operation
//!
//! One operation lives for exactly one stroke. Every accepted pointer
//! sample produces at most one stamp: the first sample only establishes
//! the position, every later one smudges color from the previous stamp's
//! position to its own.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::strategy::{SmudgeStrategy, StrategyConfig};
use crate::brush::Brush;
use crate::color::{Color, ColorSpace, Gradient};
use crate::device::{
    CompositeOp, ImageProjection, MirrorConfig, Painter, PreciseColorSource, SelectionMask,
    SharedDevice,
};
use crate::errors::EngineError;
use crate::geom::{PointF, Rect};
use crate::paint::options::{effective_spacing, effective_timing, SmudgeMode, SmudgeSettings};
use crate::paint::{DabShape, PaintInformation, SpacingInformation, TimingInformation};

/// Everything a smudge stroke needs, injected at construction
pub struct ColorSmudgeOp {
    brush: Box<dyn Brush>,
    settings: SmudgeSettings,
    projection: Option<Arc<ImageProjection>>,
    precise: PreciseColorSource,
    /// Alternate precision source over the projection, used by
    /// dulling-in-overlay sampling so paint addition effects composite
    /// correctly
    image_precise: Option<PreciseColorSource>,
    strategy: SmudgeStrategy,
    final_painter: Painter,
    paint_color: Color,
    gradient: Option<Gradient>,
    rng: StdRng,
    lod_scale: f32,
    first_stamp: bool,
    last_paint_center: PointF,
    dst_dab_rect: Rect,
    dirty: Vec<Rect>,
}

/// Read region for a stamp: the write region shifted back by the motion
/// since the previous stamp
fn source_rect(dst_rect: Rect, last_paint_center: PointF, new_center: PointF) -> Rect {
    let delta = last_paint_center - new_center;
    dst_rect.translated(delta.x.round() as i32, delta.y.round() as i32)
}

impl ColorSmudgeOp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        brush: Box<dyn Brush>,
        canvas: SharedDevice,
        projection: Option<Arc<ImageProjection>>,
        settings: SmudgeSettings,
        paint_color: Color,
        gradient: Option<Gradient>,
        composite_op: CompositeOp,
        selection: Option<SelectionMask>,
        mirror: MirrorConfig,
    ) -> Result<Self, EngineError> {
        if !(0.0..=1.0).contains(&settings.opacity) {
            return Err(EngineError::InvalidInput(format!(
                "opacity must be within 0..=1, got {}",
                settings.opacity
            )));
        }
        if brush.diameter() <= 0.0 {
            return Err(EngineError::InvalidInput(
                "brush diameter must be positive".into(),
            ));
        }

        let config = StrategyConfig {
            mode: settings.smudge_rate.mode,
            overlay: settings.overlay.enabled && projection.is_some(),
            color_rate_enabled: settings.color_rate.enabled,
            smear_alpha: settings.smudge_rate.smear_alpha,
        };

        let paint_color = paint_color.convert_to(ColorSpace::Rgba16);
        let (strategy, lod_scale) = {
            let guard = canvas.read();
            (
                SmudgeStrategy::new(config, &guard, composite_op),
                guard.lod_scale(),
            )
        };

        let image_precise = if config.overlay {
            projection
                .as_ref()
                .map(|p| PreciseColorSource::new(p.device()))
        } else {
            None
        };

        let mut final_painter = Painter::new(CompositeOp::Copy);
        final_painter.set_selection(selection);
        final_painter.set_mirror(mirror);

        tracing::debug!(
            mode = ?config.mode,
            overlay = config.overlay,
            color_rate = config.color_rate_enabled,
            "color smudge stroke started"
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(settings.seed),
            brush,
            settings,
            projection,
            precise: PreciseColorSource::new(canvas),
            image_precise,
            strategy,
            final_painter,
            paint_color,
            gradient,
            lod_scale,
            first_stamp: true,
            last_paint_center: PointF::default(),
            dst_dab_rect: Rect::default(),
            dirty: Vec::new(),
        })
    }

    /// Center of the previous stamp's destination rect
    pub fn last_paint_center(&self) -> PointF {
        self.last_paint_center
    }

    /// Canvas regions changed since the last call, for display refresh
    pub fn take_dirty_region(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.dirty)
    }

    fn check_size_too_small(&self, scale: f32) -> bool {
        let too_small = self.brush.diameter() * scale < 0.01;
        if too_small {
            tracing::trace!(scale, "stamp aborted, scale rounds to nothing");
        }
        too_small
    }

    /// Process one pointer sample: paint at most one stamp and report how
    /// far the pointer must travel before the next one.
    pub fn paint_at(&mut self, info: &PaintInformation) -> SpacingInformation {
        if !self.brush.can_paint_for(info) {
            tracing::trace!("sample rejected by brush");
            return SpacingInformation::minimal();
        }

        // Smearing must read pixel-aligned regions; a subpixel offset
        // would shift the apparent stamp center off the dab rect center.
        let subpixel = self.settings.smudge_rate.mode != SmudgeMode::Smearing;

        let scale = self.settings.size.apply(info) * self.lod_scale;
        let rotation = self.settings.rotation.apply(info);
        if self.check_size_too_small(scale) {
            return SpacingInformation::default();
        }
        let ratio = self.settings.ratio.apply(info);
        let shape = DabShape::new(scale, ratio, rotation);

        let scatter = self.settings.scatter.apply(
            &mut self.rng,
            info,
            self.brush.mask_width(&shape) as f32,
            self.brush.mask_height(&shape) as f32,
        );
        let scattered_pos = info.pos + scatter;
        let hot_spot = self.brush.hot_spot(&shape, info);

        let mut dab_color = self.paint_color;
        self.settings
            .gradient
            .apply(&mut dab_color, self.gradient.as_ref(), info);
        self.settings.hsv.apply(&mut dab_color, info);
        let lightness_strength = self.settings.lightness_strength.apply(info);

        self.dst_dab_rect = self.strategy.update_mask(
            self.brush.as_ref(),
            info,
            &shape,
            scattered_pos,
            &dab_color,
            lightness_strength,
            subpixel,
        );

        // The next stamp reads from where this dab actually landed, not
        // from the scattered cursor: rasterization rounding can shift the
        // real center slightly.
        let new_center = self.dst_dab_rect.center();
        let src_rect = source_rect(self.dst_dab_rect, self.last_paint_center, new_center);
        self.last_paint_center = new_center;

        let spacing = effective_spacing(
            self.brush.diameter(),
            scale,
            rotation,
            &self.settings.airbrush,
            &self.settings.spacing,
            &self.settings.rate,
            info,
        );

        if self.first_stamp {
            // Nothing to smudge from yet; just remember the position
            self.first_stamp = false;
            return spacing;
        }

        let sample_point = (
            (src_rect.x as f32 + hot_spot.x).round() as i32,
            (src_rect.y as f32 + hot_spot.y).round() as i32,
        );

        let opacity =
            (self.settings.opacity_option.apply(info) * self.settings.opacity).clamp(0.0, 1.0);
        let color_rate = self.settings.color_rate.value(info);
        let smudge_rate = self.settings.smudge_rate.value(info);

        let dulling_color = (self.settings.smudge_rate.mode == SmudgeMode::Dulling)
            .then(|| self.dulling_fill_color(info, sample_point));

        self.strategy.paint_dab(
            &mut self.precise,
            self.projection.as_deref(),
            src_rect,
            self.dst_dab_rect,
            sample_point,
            opacity,
            color_rate,
            smudge_rate,
            lightness_strength,
            &dab_color,
            dulling_color.as_ref(),
        );

        // Make sure every region the masked blit will touch is precise,
        // mirrors included, then write the stamp through the mask.
        let mirrored_rects = self.final_painter.calculate_all_mirrored_rects(self.dst_dab_rect);
        self.precise.read_rects(&mirrored_rects);

        self.final_painter.bit_blt_with_fixed_selection(
            self.precise.precise_device_mut(),
            self.strategy.color_device().view(),
            self.dst_dab_rect,
            self.strategy.final_selection_device(),
        );
        self.final_painter.render_mirror_mask(
            self.precise.precise_device_mut(),
            self.dst_dab_rect,
            self.strategy.color_device().view(),
            self.strategy.final_selection_device(),
        );

        let dirty = self.final_painter.take_dirty_region();
        self.precise.write_rects(&dirty);
        self.dirty.extend(dirty);

        spacing
    }

    /// Sample the dulling fill color under the brush hot spot, either
    /// averaged over the radius option's neighborhood or from the single
    /// pixel beneath it
    fn dulling_fill_color(&mut self, info: &PaintInformation, sample_point: (i32, i32)) -> Color {
        let wrapper = match (self.strategy.config().overlay, self.image_precise.as_mut()) {
            (true, Some(image_wrapper)) => image_wrapper,
            _ => &mut self.precise,
        };

        let mut color = if self.settings.smudge_radius.enabled {
            let effective_size =
                0.5 * (self.dst_dab_rect.width + self.dst_dab_rect.height) as f32;
            let sample_rect =
                self.settings
                    .smudge_radius
                    .sample_rect(info, effective_size, sample_point);
            wrapper.read_rect(sample_rect);
            let wide = self.settings.smudge_radius.sample(
                info,
                effective_size,
                sample_point,
                wrapper.precise_device(),
            );
            Color::new(wrapper.precise_space(), wide)
        } else {
            wrapper.read_rect(Rect::new(sample_point.0, sample_point.1, 1, 1));
            Color::new(
                wrapper.precise_space(),
                wrapper
                    .precise_device()
                    .wide_pixel(sample_point.0, sample_point.1),
            )
        };

        // A space mismatch with the working buffer is a programming error;
        // correct it defensively rather than blend wrong channels.
        let working_space = self.strategy.color_device().color_space();
        debug_assert_eq!(color.space(), working_space);
        if color.space() != working_space {
            tracing::warn!(
                "dulling fill color space mismatch, converting to the working space"
            );
            color = color.convert_to(working_space);
        }
        color
    }

    /// Spacing for this sample without painting. Pure in the sample and
    /// the options.
    pub fn update_spacing(&self, info: &PaintInformation) -> SpacingInformation {
        let scale = self.settings.size.apply(info) * self.lod_scale;
        let rotation = self.settings.rotation.apply(info);
        effective_spacing(
            self.brush.diameter(),
            scale,
            rotation,
            &self.settings.airbrush,
            &self.settings.spacing,
            &self.settings.rate,
            info,
        )
    }

    /// Airbrush timing for this sample without painting. Pure in the
    /// sample and the options.
    pub fn update_timing(&self, info: &PaintInformation) -> TimingInformation {
        effective_timing(&self.settings.airbrush, &self.settings.rate, info)
    }
}
