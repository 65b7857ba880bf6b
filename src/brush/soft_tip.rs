//! Soft elliptical brush tip with Gaussian edge falloff
//!
//! The falloff profile is the erf-based Gaussian used by professional
//! brush engines: parameters are precomputed per dab, then each pixel
//! evaluates two erf terms of its distance from the tip center.

use std::f32::consts::SQRT_2;

use super::Brush;
use crate::color::{Color, ColorSpace};
use crate::device::FixedDevice;
use crate::geom::{split_coordinate, PointF, Rect};
use crate::paint::{DabShape, PaintInformation};

/// Gaussian falloff parameters, computed once per dab
#[derive(Clone, Debug)]
struct GaussParams {
    center: f32,
    alphafactor: f32,
    distfactor: f32,
}

impl GaussParams {
    fn new(hardness: f32, radius: f32) -> Self {
        let fade = (1.0 - hardness) * 2.0;
        let safe_fade = fade.clamp(1e-6, 2.0);

        let center = (2.5 * (6761.0 * safe_fade - 10000.0)) / (SQRT_2 * 6761.0 * safe_fade);
        let alphafactor = 255.0 / (2.0 * erf(center));
        let distfactor = SQRT_2 * 12500.0 / (6761.0 * safe_fade * radius.max(0.5));

        Self {
            center,
            alphafactor,
            distfactor,
        }
    }

    /// Mask coverage (0..=1) at the given distance from the tip center.
    /// The erf pair evaluates to 255 at the center and falls to 0 past the
    /// fade band.
    #[inline]
    fn coverage(&self, dist: f32) -> f32 {
        let val_dist = dist * self.distfactor;
        let full_fade =
            self.alphafactor * (erf(val_dist + self.center) - erf(val_dist - self.center));
        (full_fade / 255.0).clamp(0.0, 1.0)
    }
}

/// Scalar erf (Abramowitz and Stegun formula 7.1.26), |error| < 1.5e-7
#[inline]
fn erf(x: f32) -> f32 {
    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    let x = x.abs();

    const A1: f32 = 0.254_829_6;
    const A2: f32 = -0.284_496_72;
    const A3: f32 = 1.421_413_8;
    const A4: f32 = -1.453_152_1;
    const A5: f32 = 1.061_405_4;
    const P: f32 = 0.327_591_1;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

/// A round-to-elliptical soft tip.
///
/// The dab is an ellipse with the given hardness falloff; the shape's
/// ratio squashes the minor axis and the rotation spins the ellipse about
/// the tip center.
#[derive(Debug, Clone)]
pub struct SoftEllipseTip {
    diameter: f32,
    hardness: f32,
}

impl SoftEllipseTip {
    pub fn new(diameter: f32, hardness: f32) -> Self {
        Self {
            diameter: diameter.max(1.0),
            hardness: hardness.clamp(0.0, 1.0),
        }
    }

    fn radius(&self, shape: &DabShape) -> f32 {
        self.diameter * shape.scale * 0.5
    }

    fn extent(&self, shape: &DabShape) -> i32 {
        let radius = self.radius(shape);
        let fade = ((1.0 - self.hardness) * 2.0).clamp(1e-6, 2.0);
        // Soft tips bleed beyond the nominal radius; a square extent also
        // covers every rotation of the ellipse.
        ((radius * (1.0 + fade) + 1.0).ceil() as i32).max(1) * 2
    }
}

impl Brush for SoftEllipseTip {
    fn diameter(&self) -> f32 {
        self.diameter
    }

    fn can_paint_for(&self, info: &PaintInformation) -> bool {
        info.pressure > 0.0
    }

    fn hot_spot(&self, shape: &DabShape, _info: &PaintInformation) -> PointF {
        PointF::new(
            self.mask_width(shape) as f32 / 2.0,
            self.mask_height(shape) as f32 / 2.0,
        )
    }

    fn mask_width(&self, shape: &DabShape) -> i32 {
        self.extent(shape)
    }

    fn mask_height(&self, shape: &DabShape) -> i32 {
        self.extent(shape)
    }

    fn fetch_dab(
        &self,
        space: ColorSpace,
        color: &Color,
        cursor: PointF,
        shape: &DabShape,
        _info: &PaintInformation,
        _lightness_strength: f32,
        subpixel: bool,
        dab: &mut FixedDevice,
    ) -> Rect {
        let width = self.mask_width(shape);
        let height = self.mask_height(shape);
        let radius = self.radius(shape);
        let params = GaussParams::new(self.hardness, radius);

        let top_left_x = cursor.x - width as f32 / 2.0;
        let top_left_y = cursor.y - height as f32 / 2.0;
        let (x, frac_x) = split_coordinate(top_left_x);
        let (y, frac_y) = split_coordinate(top_left_y);
        // Without subpixel positioning the dab snaps to the pixel grid and
        // the fraction is dropped from the mask sampling as well.
        let (frac_x, frac_y) = if subpixel { (frac_x, frac_y) } else { (0.0, 0.0) };

        let dst_rect = Rect::new(x, y, width, height);
        debug_assert_eq!(space.channel_count(), 4);
        dab.set_rect(dst_rect);
        dab.lazy_grow();

        let center_x = width as f32 / 2.0 + frac_x;
        let center_y = height as f32 / 2.0 + frac_y;
        let (sin, cos) = shape.rotation.sin_cos();
        let wide = color.wide();

        for row in 0..height {
            let dy = row as f32 + 0.5 - center_y;
            for col in 0..width {
                let dx = col as f32 + 0.5 - center_x;
                // Rotate into the ellipse frame, then stretch the minor axis
                let rx = dx * cos + dy * sin;
                let ry = (-dx * sin + dy * cos) / shape.ratio;
                let dist = (rx * rx + ry * ry).sqrt();

                let coverage = params.coverage(dist);
                let alpha = (wide[3] as f32 * coverage).round() as u16;
                dab.set_wide_pixel(
                    dst_rect.x + col,
                    dst_rect.y + row,
                    [wide[0], wide[1], wide[2], alpha],
                );
            }
        }

        dst_rect
    }
}
