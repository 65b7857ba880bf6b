//! Pressure-curve paint options
//!
//! Every dynamic brush parameter (size, opacity, smudge rate, ...) is an
//! independently enabled option evaluated against the current sample.
//! Options are pure: evaluating one twice with the same sample yields the
//! same value.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{PaintInformation, SpacingInformation, TimingInformation};
use crate::color::{mix_colors_wide, Color, Gradient};
use crate::device::PaintDevice;
use crate::errors::EngineError;
use crate::geom::{PointF, Rect};

/// Pressure curve types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressureCurve {
    /// Linear mapping (1:1)
    #[default]
    Linear,
    /// Soft curve (more sensitive at low pressure)
    Soft,
    /// Hard curve (less sensitive at low pressure)
    Hard,
}

impl PressureCurve {
    /// Apply the pressure curve to a raw pressure value
    pub fn apply(&self, pressure: f32) -> f32 {
        let p = pressure.clamp(0.0, 1.0);

        match self {
            PressureCurve::Linear => p,
            PressureCurve::Soft => {
                // Ease-out: more sensitive at low pressure
                1.0 - (1.0 - p).powi(2)
            }
            PressureCurve::Hard => {
                // Ease-in: less sensitive at low pressure
                p.powi(2)
            }
        }
    }
}

/// A plain on/off pressure-curve option. Disabled options evaluate to the
/// neutral factor 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveOption {
    pub enabled: bool,
    pub curve: PressureCurve,
}

impl Default for CurveOption {
    fn default() -> Self {
        Self {
            enabled: false,
            curve: PressureCurve::Linear,
        }
    }
}

impl CurveOption {
    pub fn enabled(curve: PressureCurve) -> Self {
        Self {
            enabled: true,
            curve,
        }
    }

    pub fn apply(&self, info: &PaintInformation) -> f32 {
        if self.enabled {
            self.curve.apply(info.pressure)
        } else {
            1.0
        }
    }
}

/// The two smudge compositing behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmudgeMode {
    /// Motion drags existing canvas content
    #[default]
    Smearing,
    /// Motion mixes existing content toward a sampled fill color
    Dulling,
}

/// Smudge-rate option: how strongly canvas content follows the stroke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmudgeRateOption {
    pub enabled: bool,
    pub mode: SmudgeMode,
    /// Base rate, 0..=1
    pub rate: f32,
    /// Copy the alpha channel verbatim instead of blending it
    pub smear_alpha: bool,
    pub curve: PressureCurve,
}

impl Default for SmudgeRateOption {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SmudgeMode::Smearing,
            rate: 1.0,
            smear_alpha: true,
            curve: PressureCurve::Linear,
        }
    }
}

impl SmudgeRateOption {
    /// Effective smudge rate for this sample; a disabled option smudges at
    /// full strength
    pub fn value(&self, info: &PaintInformation) -> f32 {
        if self.enabled {
            (self.curve.apply(info.pressure) * self.rate).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

/// Color-rate option: how much paint color mixes in on top of the smudge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorRateOption {
    pub enabled: bool,
    /// Base rate, 0..=1
    pub rate: f32,
    pub curve: PressureCurve,
}

impl Default for ColorRateOption {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 0.5,
            curve: PressureCurve::Linear,
        }
    }
}

impl ColorRateOption {
    /// Effective color rate; zero while disabled
    pub fn value(&self, info: &PaintInformation) -> f32 {
        if self.enabled {
            (self.curve.apply(info.pressure) * self.rate).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Dulling sample-radius option: average the fill color over a
/// neighborhood instead of a single pixel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmudgeRadiusOption {
    pub enabled: bool,
    /// Sample radius as a fraction of the dab diameter, 0..=3
    pub radius_ratio: f32,
    pub curve: PressureCurve,
}

impl Default for SmudgeRadiusOption {
    fn default() -> Self {
        Self {
            enabled: false,
            radius_ratio: 0.25,
            curve: PressureCurve::Linear,
        }
    }
}

impl SmudgeRadiusOption {
    fn radius(&self, info: &PaintInformation, effective_size: f32) -> f32 {
        let curve = if self.enabled {
            self.curve.apply(info.pressure)
        } else {
            1.0
        };
        (self.radius_ratio.clamp(0.0, 3.0) * curve * effective_size * 0.5).max(1.0)
    }

    /// The canvas rect that needs to be readable before sampling
    pub fn sample_rect(
        &self,
        info: &PaintInformation,
        effective_size: f32,
        sample_point: (i32, i32),
    ) -> Rect {
        let r = self.radius(info, effective_size).ceil() as i32;
        Rect::new(sample_point.0 - r, sample_point.1 - r, 2 * r + 1, 2 * r + 1)
    }

    /// Alpha-weighted average of the pixels within the sample circle
    pub fn sample(
        &self,
        info: &PaintInformation,
        effective_size: f32,
        sample_point: (i32, i32),
        device: &PaintDevice,
    ) -> [u16; 4] {
        let radius = self.radius(info, effective_size);
        let rect = self
            .sample_rect(info, effective_size, sample_point)
            .intersected(&device.bounds());

        let mut pixels = Vec::with_capacity(rect.area());
        let mut weights = Vec::with_capacity(rect.area());
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                let dx = (x - sample_point.0) as f32;
                let dy = (y - sample_point.1) as f32;
                if dx * dx + dy * dy <= radius * radius {
                    pixels.push(device.wide_pixel(x, y));
                    weights.push(1);
                }
            }
        }
        mix_colors_wide(&pixels, &weights)
    }
}

/// Spacing option: gap between stamps as a fraction of the dab diameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingOption {
    pub enabled: bool,
    /// Fraction of the dab diameter, e.g. 0.25 = 25%
    pub spacing: f32,
    /// Spacing independent of dab rotation
    pub isotropic: bool,
    pub curve: PressureCurve,
}

impl Default for SpacingOption {
    fn default() -> Self {
        Self {
            enabled: false,
            spacing: 0.25,
            isotropic: false,
            curve: PressureCurve::Linear,
        }
    }
}

impl SpacingOption {
    pub fn factor(&self, info: &PaintInformation) -> f32 {
        let curve = if self.enabled {
            self.curve.apply(info.pressure)
        } else {
            1.0
        };
        (self.spacing * curve).max(0.01)
    }
}

/// Airbrush option: keep stamping while the pointer is held still
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirbrushOption {
    pub enabled: bool,
    /// Stamps per second at full rate
    pub stamps_per_second: f32,
    /// Skip distance gating entirely and stamp on the timer alone
    pub ignore_spacing: bool,
}

impl Default for AirbrushOption {
    fn default() -> Self {
        Self {
            enabled: false,
            stamps_per_second: 20.0,
            ignore_spacing: false,
        }
    }
}

/// Rate option modulating the airbrush interval by pressure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateOption {
    pub enabled: bool,
    /// Base rate multiplier, 0..=1
    pub rate: f32,
    pub curve: PressureCurve,
}

impl Default for RateOption {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 1.0,
            curve: PressureCurve::Linear,
        }
    }
}

impl RateOption {
    pub fn value(&self, info: &PaintInformation) -> f32 {
        if self.enabled {
            (self.curve.apply(info.pressure) * self.rate).clamp(0.01, 1.0)
        } else {
            1.0
        }
    }
}

/// Rotation option: dab rotation driven by pressure
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationOption {
    pub enabled: bool,
    pub curve: PressureCurve,
}

impl RotationOption {
    /// Rotation in radians contributed by this option
    pub fn apply(&self, info: &PaintInformation) -> f32 {
        if self.enabled {
            self.curve.apply(info.pressure) * std::f32::consts::TAU
        } else {
            0.0
        }
    }
}

/// Scatter option: random per-dab displacement of the stamp center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterOption {
    pub enabled: bool,
    /// Displacement amplitude as a fraction of the mask dimensions, 0..=5
    pub amount: f32,
    pub curve: PressureCurve,
}

impl Default for ScatterOption {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 1.0,
            curve: PressureCurve::Linear,
        }
    }
}

impl ScatterOption {
    pub fn apply<R: Rng>(
        &self,
        rng: &mut R,
        info: &PaintInformation,
        mask_width: f32,
        mask_height: f32,
    ) -> PointF {
        if !self.enabled || self.amount <= 0.0 {
            return PointF::default();
        }
        let strength = self.amount.clamp(0.0, 5.0) * self.curve.apply(info.pressure);
        PointF::new(
            rng.gen_range(-0.5..=0.5) * strength * mask_width,
            rng.gen_range(-0.5..=0.5) * strength * mask_height,
        )
    }
}

/// Gradient option: pick the per-dab paint color from a gradient
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientOption {
    pub enabled: bool,
    pub curve: PressureCurve,
}

impl GradientOption {
    /// Replace `color` with the gradient sample for this sample's pressure
    pub fn apply(&self, color: &mut Color, gradient: Option<&Gradient>, info: &PaintInformation) {
        if !self.enabled {
            return;
        }
        if let Some(gradient) = gradient {
            let space = color.space();
            *color = gradient.color_at(self.curve.apply(info.pressure)).convert_to(space);
        }
    }
}

/// HSV adjustment option: pressure-scaled hue/saturation/value shifts
/// applied to the per-dab paint color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsvOption {
    pub enabled: bool,
    /// Full-pressure hue shift in degrees
    pub hue_shift: f32,
    /// Full-pressure saturation shift, -1..=1
    pub saturation_shift: f32,
    /// Full-pressure value shift, -1..=1
    pub value_shift: f32,
    pub curve: PressureCurve,
}

impl Default for HsvOption {
    fn default() -> Self {
        Self {
            enabled: false,
            hue_shift: 0.0,
            saturation_shift: 0.0,
            value_shift: 0.0,
            curve: PressureCurve::Linear,
        }
    }
}

impl HsvOption {
    pub fn apply(&self, color: &mut Color, info: &PaintInformation) {
        if !self.enabled {
            return;
        }
        let t = self.curve.apply(info.pressure);
        crate::color::shift_hsv(
            color,
            self.hue_shift * t,
            self.saturation_shift * t,
            self.value_shift * t,
        );
    }
}

/// Overlay option: smudge from the composited image projection instead of
/// the active layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayOption {
    pub enabled: bool,
}

/// The full option set of one smudge brush preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmudgeSettings {
    /// Base opacity, 0..=1
    pub opacity: f32,
    pub size: CurveOption,
    pub opacity_option: CurveOption,
    pub ratio: CurveOption,
    pub rotation: RotationOption,
    pub lightness_strength: CurveOption,
    pub spacing: SpacingOption,
    pub smudge_rate: SmudgeRateOption,
    pub color_rate: ColorRateOption,
    pub smudge_radius: SmudgeRadiusOption,
    pub overlay: OverlayOption,
    pub scatter: ScatterOption,
    pub gradient: GradientOption,
    pub hsv: HsvOption,
    pub airbrush: AirbrushOption,
    pub rate: RateOption,
    /// Seed for the per-stroke scatter generator
    pub seed: u64,
}

impl Default for SmudgeSettings {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            size: CurveOption::default(),
            opacity_option: CurveOption::default(),
            ratio: CurveOption::default(),
            rotation: RotationOption::default(),
            lightness_strength: CurveOption::default(),
            spacing: SpacingOption::default(),
            smudge_rate: SmudgeRateOption::default(),
            color_rate: ColorRateOption::default(),
            smudge_radius: SmudgeRadiusOption::default(),
            overlay: OverlayOption::default(),
            scatter: ScatterOption::default(),
            gradient: GradientOption::default(),
            hsv: HsvOption::default(),
            airbrush: AirbrushOption::default(),
            rate: RateOption::default(),
            seed: 0,
        }
    }
}

impl SmudgeSettings {
    /// Load a preset from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Distance (and, with an airbrush, time) until the next stamp is due.
/// Pure in the sample and the options.
pub fn effective_spacing(
    diameter: f32,
    scale: f32,
    rotation: f32,
    airbrush: &AirbrushOption,
    spacing: &SpacingOption,
    rate: &RateOption,
    info: &PaintInformation,
) -> SpacingInformation {
    let mut distance = (diameter * scale * spacing.factor(info)).max(0.5);
    if airbrush.enabled && airbrush.ignore_spacing {
        distance = 0.5;
    }
    let timed_interval_ms = if airbrush.enabled {
        Some(effective_timing(airbrush, rate, info).interval_ms)
    } else {
        None
    };
    SpacingInformation {
        distance,
        isotropic: spacing.isotropic,
        rotation,
        timed_interval_ms,
    }
}

/// Airbrush auto-repeat timing. Pure in the sample and the options.
pub fn effective_timing(
    airbrush: &AirbrushOption,
    rate: &RateOption,
    info: &PaintInformation,
) -> TimingInformation {
    if !airbrush.enabled {
        return TimingInformation::disabled();
    }
    let stamps_per_second = (airbrush.stamps_per_second * rate.value(info)).max(0.01);
    TimingInformation::every(1000.0 / stamps_per_second)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::ColorSpace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pressure_curve_linear() {
        let curve = PressureCurve::Linear;
        assert_eq!(curve.apply(0.0), 0.0);
        assert_eq!(curve.apply(0.5), 0.5);
        assert_eq!(curve.apply(1.0), 1.0);
    }

    #[test]
    fn test_pressure_curve_soft() {
        let curve = PressureCurve::Soft;
        assert_eq!(curve.apply(0.0), 0.0);
        assert_eq!(curve.apply(1.0), 1.0);
        // Soft curve should give higher output for mid pressure
        assert!(curve.apply(0.5) > 0.5);
    }

    #[test]
    fn test_pressure_curve_hard() {
        let curve = PressureCurve::Hard;
        assert_eq!(curve.apply(0.0), 0.0);
        assert_eq!(curve.apply(1.0), 1.0);
        // Hard curve should give lower output for mid pressure
        assert!(curve.apply(0.5) < 0.5);
    }

    #[test]
    fn test_pressure_clamping() {
        let curve = PressureCurve::Linear;
        assert_eq!(curve.apply(-0.5), 0.0);
        assert_eq!(curve.apply(1.5), 1.0);
    }

    #[test]
    fn test_disabled_options_are_neutral() {
        let info = PaintInformation::new(0.0, 0.0, 0.3);
        assert_eq!(CurveOption::default().apply(&info), 1.0);
        assert_eq!(
            SmudgeRateOption {
                enabled: false,
                ..Default::default()
            }
            .value(&info),
            1.0
        );
        assert_eq!(ColorRateOption::default().value(&info), 0.0);
        assert_eq!(RotationOption::default().apply(&info), 0.0);
    }

    #[test]
    fn test_smudge_rate_follows_pressure() {
        let option = SmudgeRateOption {
            enabled: true,
            rate: 0.8,
            curve: PressureCurve::Linear,
            ..Default::default()
        };
        let half = option.value(&PaintInformation::new(0.0, 0.0, 0.5));
        assert!((half - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_radius_sampling_uniform_canvas() {
        let color = crate::color::Color::from_rgba8([60, 70, 80, 255]);
        let device = PaintDevice::filled(ColorSpace::Rgba16, 16, 16, &color).unwrap();
        let option = SmudgeRadiusOption {
            enabled: true,
            radius_ratio: 1.0,
            curve: PressureCurve::Linear,
        };
        let info = PaintInformation::new(8.0, 8.0, 1.0);
        let sampled = option.sample(&info, 8.0, (8, 8), &device);
        assert_eq!(sampled, color.wide());
    }

    #[test]
    fn test_scatter_deterministic_for_seed() {
        let option = ScatterOption {
            enabled: true,
            amount: 2.0,
            curve: PressureCurve::Linear,
        };
        let info = PaintInformation::new(0.0, 0.0, 1.0);

        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..8 {
            assert_eq!(
                option.apply(&mut a, &info, 10.0, 10.0),
                option.apply(&mut b, &info, 10.0, 10.0)
            );
        }
    }

    #[test]
    fn test_scatter_disabled_is_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let info = PaintInformation::new(0.0, 0.0, 1.0);
        let offset = ScatterOption::default().apply(&mut rng, &info, 100.0, 100.0);
        assert_eq!(offset, PointF::default());
    }

    #[test]
    fn test_effective_spacing_scales_with_diameter() {
        let info = PaintInformation::new(0.0, 0.0, 1.0);
        let spacing = SpacingOption::default();
        let airbrush = AirbrushOption::default();
        let rate = RateOption::default();

        let small = effective_spacing(10.0, 1.0, 0.0, &airbrush, &spacing, &rate, &info);
        let large = effective_spacing(40.0, 1.0, 0.0, &airbrush, &spacing, &rate, &info);
        assert!(large.distance > small.distance);
        assert!(small.timed_interval_ms.is_none());
    }

    #[test]
    fn test_effective_timing_pure_and_idempotent() {
        let info = PaintInformation::new(0.0, 0.0, 0.7);
        let airbrush = AirbrushOption {
            enabled: true,
            stamps_per_second: 10.0,
            ignore_spacing: false,
        };
        let rate = RateOption::default();

        let first = effective_timing(&airbrush, &rate, &info);
        let second = effective_timing(&airbrush, &rate, &info);
        assert_eq!(first, second);
        assert!(first.enabled);
        assert!((first.interval_ms - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_gradient_option_replaces_color() {
        let gradient = crate::color::Gradient::new(vec![
            crate::color::GradientStop {
                t: 0.0,
                color: [0, 0, 255, 255],
            },
            crate::color::GradientStop {
                t: 1.0,
                color: [255, 0, 0, 255],
            },
        ])
        .unwrap();

        let mut color = Color::from_rgba8([0, 255, 0, 255]).convert_to(ColorSpace::Rgba16);
        let option = GradientOption {
            enabled: true,
            curve: PressureCurve::Linear,
        };
        option.apply(&mut color, Some(&gradient), &PaintInformation::new(0.0, 0.0, 1.0));
        // Full pressure lands on the last stop
        assert_eq!(color.data()[0], 65535);
        assert_eq!(color.data()[2], 0);

        // Disabled option leaves the color alone
        let mut untouched = Color::from_rgba8([0, 255, 0, 255]);
        GradientOption::default().apply(
            &mut untouched,
            Some(&gradient),
            &PaintInformation::new(0.0, 0.0, 1.0),
        );
        assert_eq!(untouched, Color::from_rgba8([0, 255, 0, 255]));
    }

    #[test]
    fn test_hsv_option_scales_with_pressure() {
        let option = HsvOption {
            enabled: true,
            hue_shift: 120.0,
            ..Default::default()
        };
        let red = Color::from_rgba8([255, 0, 0, 255]).convert_to(ColorSpace::Rgba16);

        let mut full = red;
        option.apply(&mut full, &PaintInformation::new(0.0, 0.0, 1.0));
        // Full pressure rotates red all the way to green
        assert!(full.data()[1] > 60000);

        let mut none = red;
        option.apply(&mut none, &PaintInformation::new(0.0, 0.0, 0.0));
        assert_eq!(none, red);
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let mut settings = SmudgeSettings::default();
        settings.smudge_rate.mode = SmudgeMode::Dulling;
        settings.color_rate.enabled = true;
        settings.scatter.amount = 0.5;
        settings.seed = 42;

        let json = settings.to_json().unwrap();
        let parsed = SmudgeSettings::from_json(&json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_settings_default_from_empty_json() {
        let parsed = SmudgeSettings::from_json("{}").unwrap();
        assert_eq!(parsed, SmudgeSettings::default());
    }
}
