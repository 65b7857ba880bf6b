//! Brush collaborator interface
//!
//! The smudge operation does not rasterize brush tips itself; it asks a
//! `Brush` for a color dab at a given shape and position and works with
//! the returned pixels. The engine ships one implementation, the soft
//! elliptical tip, but anything fulfilling the trait can drive a stroke.

mod soft_tip;

pub use soft_tip::SoftEllipseTip;

use crate::color::{Color, ColorSpace};
use crate::device::FixedDevice;
use crate::geom::{PointF, Rect};
use crate::paint::{DabShape, PaintInformation};

/// A brush tip that can rasterize color dabs
pub trait Brush {
    /// Nominal tip diameter in pixels at scale 1.0
    fn diameter(&self) -> f32;

    /// Whether a stamp can be produced for this sample at all
    fn can_paint_for(&self, info: &PaintInformation) -> bool;

    /// Offset of the cursor position inside the dab mask
    fn hot_spot(&self, shape: &DabShape, info: &PaintInformation) -> PointF;

    fn mask_width(&self, shape: &DabShape) -> i32;

    fn mask_height(&self, shape: &DabShape) -> i32;

    /// Rasterize a color dab into `dab`, positioned so the tip center
    /// lands on `cursor`. With `subpixel` disabled the dab is aligned to
    /// the pixel grid. `lightness_strength` scales how strongly a textured
    /// tip modulates the color's lightness; uniform tips ignore it.
    /// Returns the destination rect the dab occupies, which always equals
    /// the dab's bounds.
    #[allow(clippy::too_many_arguments)]
    fn fetch_dab(
        &self,
        space: ColorSpace,
        color: &Color,
        cursor: PointF,
        shape: &DabShape,
        info: &PaintInformation,
        lightness_strength: f32,
        subpixel: bool,
        dab: &mut FixedDevice,
    ) -> Rect;
}
