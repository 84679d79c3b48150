mod renderer;
mod surface;
mod transform;

pub use renderer::{render_scene, PixelSurface};
pub use surface::{
    Color, ColorParseError, DrawingSurface, Font, GradientError, GradientStop, LinearGradient,
    Paint, SurfaceError,
};
pub use transform::{
    project, DrawMode, DrawModeParseError, GeometryError, RawSurfaceGeometry, SurfaceGeometry,
};
