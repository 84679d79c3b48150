use thiserror::Error;

use crate::app::math::Vec3;

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rgb` or `#rrggbb`.
    pub fn from_hex(value: &str) -> Result<Self, ColorParseError> {
        let digits = value.strip_prefix('#').ok_or_else(|| ColorParseError {
            value: value.to_string(),
        })?;
        let parse = |s: &str| u8::from_str_radix(s, 16);
        match digits.len() {
            3 => {
                let mut channels = [0u8; 3];
                for (slot, digit) in channels.iter_mut().zip(digits.chars()) {
                    let nibble = parse(&digit.to_string()).map_err(|_| ColorParseError {
                        value: value.to_string(),
                    })?;
                    *slot = nibble * 16 + nibble;
                }
                Ok(Color::rgb(channels[0], channels[1], channels[2]))
            }
            6 => {
                let channel = |range: std::ops::Range<usize>| {
                    parse(&digits[range]).map_err(|_| ColorParseError {
                        value: value.to_string(),
                    })
                };
                Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
            }
            _ => Err(ColorParseError {
                value: value.to_string(),
            }),
        }
    }

    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid color literal {value:?}; expected #rgb or #rrggbb")]
pub struct ColorParseError {
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

#[derive(Debug, Error, PartialEq)]
pub enum GradientError {
    #[error("gradient needs at least one stop")]
    Empty,
    #[error("gradient stop offset {offset} is outside 0..=1")]
    OffsetOutOfRange { offset: f32 },
    #[error("gradient stop offsets must be non-decreasing, got {previous} then {offset}")]
    OutOfOrder { previous: f32, offset: f32 },
}

/// Ordered color ramp sampled across a rectangle's horizontal extent.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    stops: Vec<GradientStop>,
}

impl LinearGradient {
    pub fn new(stops: Vec<GradientStop>) -> Result<Self, GradientError> {
        if stops.is_empty() {
            return Err(GradientError::Empty);
        }
        let mut previous = 0.0f32;
        for (i, stop) in stops.iter().enumerate() {
            if !stop.offset.is_finite() || !(0.0..=1.0).contains(&stop.offset) {
                return Err(GradientError::OffsetOutOfRange {
                    offset: stop.offset,
                });
            }
            if i > 0 && stop.offset < previous {
                return Err(GradientError::OutOfOrder {
                    previous,
                    offset: stop.offset,
                });
            }
            previous = stop.offset;
        }
        Ok(Self { stops })
    }

    pub fn sample(&self, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let first = self.stops[0];
        if t <= first.offset {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (t - a.offset) / span);
            }
        }
        self.stops[self.stops.len() - 1].color
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Color),
    Gradient(LinearGradient),
}

impl Paint {
    /// Flat sample for call sites that cannot spread a ramp (outlines,
    /// glyphs).
    pub fn edge_color(&self) -> Color {
        match self {
            Paint::Solid(color) => *color,
            Paint::Gradient(gradient) => gradient.sample(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub size_px: f32,
    pub family: String,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            size_px: 15.0,
            family: "Arial".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("no image registered under key {key:?}")]
    MissingImage { key: String },
    #[error("failed to load image {key:?} from {path:?}: {source}")]
    ImageLoad {
        key: String,
        path: std::path::PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("draw size ({width}, {height}) is not drawable")]
    DegenerateSize { width: f32, height: f32 },
}

/// Raster capability the render pipeline draws through. Origins and
/// sizes are in screen pixels; `rotation_z` is degrees about the origin.
pub trait DrawingSurface {
    fn clear(&mut self, color: Color);

    fn fill_rect(
        &mut self,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        paint: &Paint,
    ) -> Result<(), SurfaceError>;

    fn stroke_rect(
        &mut self,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        paint: &Paint,
    ) -> Result<(), SurfaceError>;

    fn fill_text(
        &mut self,
        text: &str,
        origin: Vec3,
        rotation_z: f32,
        font: &Font,
        color: Color,
    ) -> Result<(), SurfaceError>;

    fn stroke_text(
        &mut self,
        text: &str,
        origin: Vec3,
        rotation_z: f32,
        font: &Font,
        color: Color,
    ) -> Result<(), SurfaceError>;

    fn draw_image(
        &mut self,
        key: &str,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        flip: Vec3,
    ) -> Result<(), SurfaceError>;
}
