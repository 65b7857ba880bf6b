//! Paint information: per-sample input data and per-stamp derived values

pub mod options;

use serde::{Deserialize, Serialize};

use crate::geom::PointF;

/// One pointer-motion sample as delivered by the input layer.
///
/// Immutable once produced; every stamp of a stroke is driven by exactly
/// one sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaintInformation {
    /// Position in canvas space
    pub pos: PointF,
    /// Pen pressure (0.0 - 1.0)
    pub pressure: f32,
    /// Tilt X angle in degrees (-90 to 90)
    pub tilt_x: f32,
    /// Tilt Y angle in degrees (-90 to 90)
    pub tilt_y: f32,
    /// Direction of travel in radians
    pub drawing_angle: f32,
    /// Milliseconds since the stroke started
    pub time_ms: u64,
}

impl PaintInformation {
    /// Create a sample with neutral tilt and angle
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            pos: PointF::new(x, y),
            pressure: pressure.clamp(0.0, 1.0),
            tilt_x: 0.0,
            tilt_y: 0.0,
            drawing_angle: 0.0,
            time_ms: 0,
        }
    }

    /// Create with full parameters
    pub fn with_tilt(x: f32, y: f32, pressure: f32, tilt_x: f32, tilt_y: f32) -> Self {
        Self {
            pos: PointF::new(x, y),
            pressure: pressure.clamp(0.0, 1.0),
            tilt_x: tilt_x.clamp(-90.0, 90.0),
            tilt_y: tilt_y.clamp(-90.0, 90.0),
            drawing_angle: 0.0,
            time_ms: 0,
        }
    }

    pub fn at_time(mut self, time_ms: u64) -> Self {
        self.time_ms = time_ms;
        self
    }
}

/// Scale, aspect ratio and rotation of one stamp, derived per stamp from
/// the pressure-curve options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DabShape {
    pub scale: f32,
    pub ratio: f32,
    pub rotation: f32,
}

impl DabShape {
    pub fn new(scale: f32, ratio: f32, rotation: f32) -> Self {
        Self {
            scale: scale.max(0.0),
            ratio: ratio.clamp(0.01, 1.0),
            rotation,
        }
    }
}

/// How far the pointer must travel before the next stamp is due.
///
/// The default value is the "empty" spacing an aborted stamp reports; a
/// rejected sample reports `minimal()` instead.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpacingInformation {
    /// Distance in pixels; zero means no spacing was computed
    pub distance: f32,
    /// Spacing independent of the dab rotation
    pub isotropic: bool,
    /// Dab rotation the distance was computed for
    pub rotation: f32,
    /// Airbrush auto-repeat interval, if timed stamping applies
    pub timed_interval_ms: Option<f32>,
}

impl SpacingInformation {
    pub fn pixels(distance: f32) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }

    /// The neutral spacing returned for rejected samples
    pub fn minimal() -> Self {
        Self::pixels(1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.distance <= 0.0
    }
}

/// Airbrush auto-repeat timing for the current sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingInformation {
    pub enabled: bool,
    pub interval_ms: f32,
}

impl TimingInformation {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn every(interval_ms: f32) -> Self {
        Self {
            enabled: true,
            interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_is_clamped() {
        assert_eq!(PaintInformation::new(0.0, 0.0, 1.5).pressure, 1.0);
        assert_eq!(PaintInformation::new(0.0, 0.0, -0.5).pressure, 0.0);
    }

    #[test]
    fn test_dab_shape_clamps() {
        let shape = DabShape::new(-1.0, 0.0, 0.3);
        assert_eq!(shape.scale, 0.0);
        assert!(shape.ratio > 0.0);
    }

    #[test]
    fn test_spacing_flavors() {
        assert!(SpacingInformation::default().is_empty());
        assert!(!SpacingInformation::minimal().is_empty());
        assert_eq!(SpacingInformation::minimal().distance, 1.0);
    }
}
