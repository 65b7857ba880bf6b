//! Color storage and numeric color operations
//!
//! Pixel math throughout the engine runs in a widened 16-bit "wide" domain
//! (0..=65535 per channel, straight alpha) regardless of how a device
//! stores its channels. Narrow 8-bit storage quantizes on write, which is
//! exactly the rounding error the precise pipeline exists to avoid
//! compounding.

use serde::{Deserialize, Serialize};

/// Channel layout and depth of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    /// Single 8-bit coverage channel (brush masks, selections)
    Alpha8,
    /// 8-bit RGBA, straight alpha
    #[default]
    Rgba8,
    /// 16-bit RGBA, straight alpha (precision-preserving)
    Rgba16,
}

impl ColorSpace {
    pub fn channel_count(&self) -> usize {
        match self {
            ColorSpace::Alpha8 => 1,
            ColorSpace::Rgba8 | ColorSpace::Rgba16 => 4,
        }
    }

    /// Maximum channel value in native storage
    pub fn channel_max(&self) -> u16 {
        match self {
            ColorSpace::Alpha8 | ColorSpace::Rgba8 => 255,
            ColorSpace::Rgba16 => 65535,
        }
    }

    /// Widen a native channel value into the wide domain
    #[inline]
    pub fn widen(&self, value: u16) -> u16 {
        match self {
            ColorSpace::Alpha8 | ColorSpace::Rgba8 => value.min(255) * 257,
            ColorSpace::Rgba16 => value,
        }
    }

    /// Narrow a wide-domain value back into native storage, rounding
    #[inline]
    pub fn narrow(&self, value: u16) -> u16 {
        match self {
            ColorSpace::Alpha8 | ColorSpace::Rgba8 => ((value as u32 + 128) / 257) as u16,
            ColorSpace::Rgba16 => value,
        }
    }
}

/// Fully transparent wide-domain pixel
pub const TRANSPARENT_WIDE: [u16; 4] = [0, 0, 0, 0];

/// A single color carried in a specific color space.
///
/// Channel data is stored in the native range of `space`. The alpha
/// channel always lives at index 3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    space: ColorSpace,
    data: [u16; 4],
}

impl Color {
    pub fn new(space: ColorSpace, data: [u16; 4]) -> Self {
        let max = space.channel_max();
        let clamped = [
            data[0].min(max),
            data[1].min(max),
            data[2].min(max),
            data[3].min(max),
        ];
        Self {
            space,
            data: clamped,
        }
    }

    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self {
            space: ColorSpace::Rgba8,
            data: [
                rgba[0] as u16,
                rgba[1] as u16,
                rgba[2] as u16,
                rgba[3] as u16,
            ],
        }
    }

    pub fn transparent(space: ColorSpace) -> Self {
        Self {
            space,
            data: [0; 4],
        }
    }

    pub fn space(&self) -> ColorSpace {
        self.space
    }

    pub fn data(&self) -> [u16; 4] {
        self.data
    }

    /// Channel values widened into the wide domain
    pub fn wide(&self) -> [u16; 4] {
        let s = self.space;
        [
            s.widen(self.data[0]),
            s.widen(self.data[1]),
            s.widen(self.data[2]),
            s.widen(self.data[3]),
        ]
    }

    /// Convert into another color space, widening or narrowing channels
    pub fn convert_to(&self, space: ColorSpace) -> Color {
        if space == self.space {
            return *self;
        }
        let wide = self.wide();
        Color {
            space,
            data: [
                space.narrow(wide[0]),
                space.narrow(wide[1]),
                space.narrow(wide[2]),
                space.narrow(wide[3]),
            ],
        }
    }

    pub fn set_wide(&mut self, wide: [u16; 4]) {
        self.data = [
            self.space.narrow(wide[0]),
            self.space.narrow(wide[1]),
            self.space.narrow(wide[2]),
            self.space.narrow(wide[3]),
        ];
    }
}

/// Alpha-weighted average of wide-domain pixels.
///
/// Each pixel contributes in proportion to `weight * alpha`, so fully
/// transparent pixels influence only the resulting alpha. With an empty
/// input the result is transparent.
pub fn mix_colors_wide(pixels: &[[u16; 4]], weights: &[u32]) -> [u16; 4] {
    debug_assert_eq!(pixels.len(), weights.len());

    let mut color_acc = [0u64; 3];
    let mut alpha_acc = 0u64;
    let mut weight_acc = 0u64;

    for (pixel, &weight) in pixels.iter().zip(weights) {
        let w = weight as u64;
        let a = pixel[3] as u64;
        for (acc, channel) in color_acc.iter_mut().zip(pixel.iter()) {
            *acc += *channel as u64 * a * w;
        }
        alpha_acc += a * w;
        weight_acc += w;
    }

    if weight_acc == 0 {
        return TRANSPARENT_WIDE;
    }

    let alpha = (alpha_acc + weight_acc / 2) / weight_acc;
    if alpha == 0 {
        return TRANSPARENT_WIDE;
    }
    [
        ((color_acc[0] + alpha_acc / 2) / alpha_acc.max(1)) as u16,
        ((color_acc[1] + alpha_acc / 2) / alpha_acc.max(1)) as u16,
        ((color_acc[2] + alpha_acc / 2) / alpha_acc.max(1)) as u16,
        alpha as u16,
    ]
}

/// RGB (0..=1) to HSV; hue in degrees
fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta < 1e-6 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let s = if max < 1e-6 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h = h.rem_euclid(360.0);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    (r + m, g + m, b + m)
}

/// Shift a color's hue (degrees), saturation and value (both additive,
/// -1..=1). Alpha is untouched.
pub fn shift_hsv(color: &mut Color, hue_shift: f32, sat_shift: f32, val_shift: f32) {
    if hue_shift == 0.0 && sat_shift == 0.0 && val_shift == 0.0 {
        return;
    }
    let wide = color.wide();
    let r = wide[0] as f32 / 65535.0;
    let g = wide[1] as f32 / 65535.0;
    let b = wide[2] as f32 / 65535.0;

    let (h, s, v) = rgb_to_hsv(r, g, b);
    let (r, g, b) = hsv_to_rgb(
        h + hue_shift,
        (s + sat_shift).clamp(0.0, 1.0),
        (v + val_shift).clamp(0.0, 1.0),
    );

    color.set_wide([
        (r * 65535.0).round() as u16,
        (g * 65535.0).round() as u16,
        (b * 65535.0).round() as u16,
        wide[3],
    ]);
}

/// One stop of a color gradient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Position along the gradient, 0..=1
    pub t: f32,
    pub color: [u8; 4],
}

/// A multi-stop RGBA gradient sampled by the gradient paint option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    stops: Vec<GradientStop>,
}

impl Gradient {
    /// Build a gradient from stops; they are sorted by position.
    pub fn new(mut stops: Vec<GradientStop>) -> Result<Self, crate::errors::EngineError> {
        if stops.is_empty() {
            return Err(crate::errors::EngineError::InvalidInput(
                "gradient needs at least one stop".into(),
            ));
        }
        stops.sort_by(|a, b| a.t.total_cmp(&b.t));
        Ok(Self { stops })
    }

    /// Sample the gradient at `t` (clamped to 0..=1)
    pub fn color_at(&self, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);

        let first = self.stops[0];
        if t <= first.t || self.stops.len() == 1 {
            return Color::from_rgba8(first.color).convert_to(ColorSpace::Rgba16);
        }
        let last = self.stops[self.stops.len() - 1];
        if t >= last.t {
            return Color::from_rgba8(last.color).convert_to(ColorSpace::Rgba16);
        }

        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t >= a.t && t <= b.t {
                let span = (b.t - a.t).max(1e-6);
                let f = (t - a.t) / span;
                let lerp = |x: u8, y: u8| -> u16 {
                    let xw = x as f32 * 257.0;
                    let yw = y as f32 * 257.0;
                    (xw + (yw - xw) * f).round() as u16
                };
                return Color::new(
                    ColorSpace::Rgba16,
                    [
                        lerp(a.color[0], b.color[0]),
                        lerp(a.color[1], b.color[1]),
                        lerp(a.color[2], b.color[2]),
                        lerp(a.color[3], b.color[3]),
                    ],
                );
            }
        }
        Color::from_rgba8(last.color).convert_to(ColorSpace::Rgba16)
    }
}
