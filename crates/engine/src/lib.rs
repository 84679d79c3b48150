use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub mod app;

pub use app::{
    project, render_scene, run_app, run_app_with_metrics, AppError, AudioHandle, AudioMixer, Axis,
    BindingId, CallbackError, Camera, ClickCallback, Color, ColorParseError, CollisionCallback,
    DrawMode, DrawModeParseError, Drawable, DrawableKind, DrawingSurface, EntityId, EventCallback,
    EventKind, Font, GeometryError, GradientError, GradientStop, InputEvent, LinearGradient,
    LoopConfig, LoopMetricsSnapshot, MetricsHandle, OnLoadCallback, Paint, PixelSurface,
    RawSurfaceGeometry, Scene, SceneError, SceneId, SceneSelector, SceneWorld, SpriteData,
    SquareData, SurfaceError, SurfaceGeometry, TextData, UpdateTask, Vec3, WorldClock,
    DEFAULT_ANIMATION_SPEED, DEFAULT_SQUARE_COLOR, DEFAULT_TAG,
};

pub const CONFIG_ENV_VAR: &str = "SCENELOOP_CONFIG";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to read config file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid surface geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),
    #[error("invalid background color: {0}")]
    InvalidBackground(#[from] ColorParseError),
    #[error(transparent)]
    InvalidDrawMode(#[from] DrawModeParseError),
}

/// Startup configuration, normally loaded from the JSON file named by
/// `SCENELOOP_CONFIG`. Everything except the surface geometry has a
/// default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_window_title")]
    pub window_title: String,
    pub surface: RawSurfaceGeometry,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub draw_mode: Option<String>,
    #[serde(default = "default_target_tps")]
    pub target_tps: u32,
    #[serde(default = "default_max_ticks_per_frame")]
    pub max_ticks_per_frame: u32,
    #[serde(default = "default_max_frame_delta_ms")]
    pub max_frame_delta_ms: u64,
    #[serde(default = "default_metrics_log_interval_ms")]
    pub metrics_log_interval_ms: u64,
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,
}

fn default_window_title() -> String {
    "Sceneloop".to_string()
}

fn default_target_tps() -> u32 {
    60
}

fn default_max_ticks_per_frame() -> u32 {
    5
}

fn default_max_frame_delta_ms() -> u64 {
    250
}

fn default_metrics_log_interval_ms() -> u64 {
    1000
}

fn default_asset_root() -> PathBuf {
    PathBuf::from("assets")
}

impl AppConfig {
    /// Validates the raw config and builds the loop settings plus an
    /// empty world with the configured surface, background, and draw
    /// mode. Fails fast on any invalid field.
    pub fn build(&self) -> Result<(LoopConfig, SceneWorld), StartupError> {
        let geometry = SurfaceGeometry::try_from(self.surface)?;
        let mut world = SceneWorld::new(geometry);
        if let Some(hex) = &self.background {
            world.background = Color::from_hex(hex)?;
        }
        if let Some(mode) = &self.draw_mode {
            world.draw_mode = mode.parse()?;
        }

        let config = LoopConfig {
            window_title: self.window_title.clone(),
            asset_root: self.asset_root.clone(),
            target_tps: self.target_tps,
            max_frame_delta: Duration::from_millis(self.max_frame_delta_ms),
            max_ticks_per_frame: self.max_ticks_per_frame,
            metrics_log_interval: Duration::from_millis(self.metrics_log_interval_ms),
        };
        Ok((config, world))
    }
}

/// Loads the config file named by `SCENELOOP_CONFIG`, or `Ok(None)`
/// when the variable is unset.
pub fn load_config() -> Result<Option<AppConfig>, StartupError> {
    match env::var(CONFIG_ENV_VAR) {
        Ok(value) => read_config_file(Path::new(&value)).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar {
            var: CONFIG_ENV_VAR,
            source,
        }),
    }
}

pub fn read_config_file(path: &Path) -> Result<AppConfig, StartupError> {
    let contents = fs::read_to_string(path).map_err(|source| StartupError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StartupError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}
