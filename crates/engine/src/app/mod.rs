mod audio;
mod entity;
mod events;
mod loop_runner;
mod math;
mod metrics;
mod rendering;
mod scene;
mod systems;

pub use audio::{AudioHandle, AudioMixer};
pub use entity::{
    CallbackError, ClickCallback, CollisionCallback, Drawable, DrawableKind, EntityId, SpriteData,
    SquareData, TextData, DEFAULT_ANIMATION_SPEED, DEFAULT_SQUARE_COLOR, DEFAULT_TAG,
};
pub use events::{BindingId, EventCallback, EventKind, InputEvent};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig};
pub use math::{Axis, Camera, Vec3};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    project, render_scene, Color, ColorParseError, DrawMode, DrawModeParseError, DrawingSurface,
    Font, GeometryError, GradientError, GradientStop, LinearGradient, Paint, PixelSurface,
    RawSurfaceGeometry, SurfaceError, SurfaceGeometry,
};
pub use scene::{
    OnLoadCallback, Scene, SceneError, SceneId, SceneSelector, SceneWorld, UpdateTask, WorldClock,
};
