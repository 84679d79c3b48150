use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::app::math::Vec3;

/// Drawing convention controlling how world coordinates map to screen
/// pixels. Parsed from configuration; there is no fallback mode, an
/// unrecognized name is a startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    /// Bottom-left world origin, y up.
    #[default]
    Normal,
    /// Bottom-left origin with the entity's own extent folded into the
    /// origin point.
    Centered,
    /// Raw top-left pixel addressing, y down.
    Canvas,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized draw mode {value:?}; expected one of normal, standard, centered, center, canvas, javascript")]
pub struct DrawModeParseError {
    pub value: String,
}

impl FromStr for DrawMode {
    type Err = DrawModeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "normal" | "standard" => Ok(DrawMode::Normal),
            "centered" | "center" => Ok(DrawMode::Centered),
            "canvas" | "javascript" => Ok(DrawMode::Canvas),
            other => Err(DrawModeParseError {
                value: other.to_string(),
            }),
        }
    }
}

impl DrawMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawMode::Normal => "normal",
            DrawMode::Centered => "centered",
            DrawMode::Canvas => "canvas",
        }
    }
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("surface dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },
    #[error("units-per-pixel scale must be finite and positive on every axis, got ({x}, {y}, {z})")]
    InvalidScale { x: f32, y: f32, z: f32 },
}

/// Validated pixel dimensions and world-to-pixel scale of the render
/// target. Constructed once at startup; the projection math trusts it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    width: u32,
    height: u32,
    units_per_pixel: Vec3,
}

impl SurfaceGeometry {
    pub fn new(width: u32, height: u32, units_per_pixel: Vec3) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::ZeroDimension { width, height });
        }
        let valid_axis = |v: f32| v.is_finite() && v > 0.0;
        if !valid_axis(units_per_pixel.x)
            || !valid_axis(units_per_pixel.y)
            || !valid_axis(units_per_pixel.z)
        {
            return Err(GeometryError::InvalidScale {
                x: units_per_pixel.x,
                y: units_per_pixel.y,
                z: units_per_pixel.z,
            });
        }
        Ok(Self {
            width,
            height,
            units_per_pixel,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn units_per_pixel(&self) -> Vec3 {
        self.units_per_pixel
    }
}

/// Serde-facing form of [`SurfaceGeometry`] used by the config file.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawSurfaceGeometry {
    pub width: u32,
    pub height: u32,
    pub units_per_pixel: [f32; 3],
}

impl TryFrom<RawSurfaceGeometry> for SurfaceGeometry {
    type Error = GeometryError;

    fn try_from(raw: RawSurfaceGeometry) -> Result<Self, GeometryError> {
        SurfaceGeometry::new(
            raw.width,
            raw.height,
            Vec3::new(
                raw.units_per_pixel[0],
                raw.units_per_pixel[1],
                raw.units_per_pixel[2],
            ),
        )
    }
}

/// Maps a world-space position/size pair to the screen-space origin the
/// draw calls use. Both vectors are converted to pixels first; the mode
/// selects the formula.
pub fn project(position: Vec3, size: Vec3, mode: DrawMode, geometry: &SurfaceGeometry) -> Vec3 {
    let p = position.to_pixels(geometry.units_per_pixel);
    let s = size.to_pixels(geometry.units_per_pixel);
    let height = geometry.height as f32;

    match mode {
        DrawMode::Normal => Vec3::new(p.x, height - p.y - s.y, 0.0),
        DrawMode::Centered => Vec3::new(p.x + s.x, height - p.y - s.y - p.y / 2.0, p.z),
        DrawMode::Canvas => Vec3::new(p.x, p.y, p.x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry_500() -> SurfaceGeometry {
        SurfaceGeometry::new(500, 500, Vec3::splat(100.0)).expect("valid geometry")
    }

    #[test]
    fn normal_mode_flips_y_against_surface_height() {
        let origin = project(
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            DrawMode::Normal,
            &geometry_500(),
        );
        assert_eq!(origin, Vec3::new(100.0, 350.0, 0.0));
    }

    #[test]
    fn centered_mode_offsets_by_size_and_half_position() {
        let origin = project(
            Vec3::new(1.0, 1.0, 0.5),
            Vec3::new(0.5, 0.5, 0.0),
            DrawMode::Centered,
            &geometry_500(),
        );
        // x: 100 + 50; y: 500 - 100 - 50 - 50; z passes through in pixels
        assert_eq!(origin, Vec3::new(150.0, 300.0, 50.0));
    }

    #[test]
    fn canvas_mode_uses_raw_pixel_coordinates() {
        let origin = project(
            Vec3::new(2.0, 1.5, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            DrawMode::Canvas,
            &geometry_500(),
        );
        assert_eq!(origin, Vec3::new(200.0, 150.0, 200.0));
    }

    #[test]
    fn draw_mode_parses_all_aliases() {
        assert_eq!("normal".parse::<DrawMode>().unwrap(), DrawMode::Normal);
        assert_eq!("standard".parse::<DrawMode>().unwrap(), DrawMode::Normal);
        assert_eq!("centered".parse::<DrawMode>().unwrap(), DrawMode::Centered);
        assert_eq!("center".parse::<DrawMode>().unwrap(), DrawMode::Centered);
        assert_eq!("canvas".parse::<DrawMode>().unwrap(), DrawMode::Canvas);
        assert_eq!("javascript".parse::<DrawMode>().unwrap(), DrawMode::Canvas);
    }

    #[test]
    fn unknown_draw_mode_is_an_error() {
        let error = "isometric".parse::<DrawMode>().unwrap_err();
        assert_eq!(error.value, "isometric");
    }

    #[test]
    fn geometry_rejects_zero_dimensions_and_bad_scale() {
        assert!(matches!(
            SurfaceGeometry::new(0, 500, Vec3::splat(100.0)),
            Err(GeometryError::ZeroDimension { .. })
        ));
        assert!(matches!(
            SurfaceGeometry::new(500, 500, Vec3::new(100.0, 0.0, 100.0)),
            Err(GeometryError::InvalidScale { .. })
        ));
        assert!(matches!(
            SurfaceGeometry::new(500, 500, Vec3::new(f32::NAN, 100.0, 100.0)),
            Err(GeometryError::InvalidScale { .. })
        ));
    }
}
