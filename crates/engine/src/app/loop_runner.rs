use std::path::PathBuf;
use std::time::{Duration, Instant};

use pixels::{Error as PixelsError, Pixels, SurfaceTexture};
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::Key;
use winit::window::WindowBuilder;

use super::events::InputEvent;
use super::metrics::{MetricsAccumulator, MetricsHandle};
use super::rendering::{render_scene, PixelSurface};
use super::scene::SceneWorld;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub asset_root: PathBuf,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Sceneloop".to_string(),
            asset_root: PathBuf::from("assets"),
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize frame buffer: {0}")]
    CreateFrameBuffer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, world: SceneWorld) -> Result<(), AppError> {
    let metrics_handle = MetricsHandle::default();
    run_app_with_metrics(config, world, metrics_handle)
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    mut world: SceneWorld,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let geometry = *world.geometry();
    let target_tps = config.target_tps.max(1);
    // target_tps is clamped to at least 1, so this cannot fail
    let _ = world.set_tick_rate(target_tps as f32);

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window: &'static winit::window::Window = Box::leak(Box::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                geometry.width() as f64,
                geometry.height() as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    ));
    let window_for_loop = window;

    let inner_size = window.inner_size();
    let surface_texture = SurfaceTexture::new(inner_size.width, inner_size.height, window);
    let mut pixels = Pixels::new(geometry.width(), geometry.height(), surface_texture)
        .map_err(AppError::CreateFrameBuffer)?;
    let mut surface = PixelSurface::new(&geometry, config.asset_root.clone());

    event_loop.set_control_flow(ControlFlow::Poll);

    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(target_tps));
    let mut input_collector = InputCollector::new(inner_size.width, inner_size.height, &geometry);

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        input_collector.set_window_size(new_size.width, new_size.height);
                        if let Err(error) =
                            pixels.resize_surface(new_size.width.max(1), new_size.height.max(1))
                        {
                            warn!(error = %error, "surface_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window_for_loop.inner_size();
                        input_collector.set_window_size(size.width, size.height);
                        if let Err(error) =
                            pixels.resize_surface(size.width.max(1), size.height.max(1))
                        {
                            warn!(error = %error, "surface_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        input_collector
                            .set_cursor_position_px(position.x as f32, position.y as f32);
                    }
                    WindowEvent::CursorLeft { .. } => {
                        input_collector.clear_cursor_position();
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        input_collector.handle_mouse_input(button, state);
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        input_collector.handle_keyboard_input(&event);
                    }
                    WindowEvent::RedrawRequested => {
                        for input_event in input_collector.drain() {
                            world.dispatch_input(&input_event);
                        }

                        let now = Instant::now();
                        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;

                        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
                        accumulator = accumulator.saturating_add(clamped_frame_dt);

                        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                        for _ in 0..step_plan.ticks_to_run {
                            world.step();
                            metrics_accumulator.record_tick();
                        }
                        accumulator = step_plan.remaining_accumulator;

                        if step_plan.dropped_backlog > Duration::ZERO {
                            let dropped =
                                dropped_ticks_from_backlog(step_plan.dropped_backlog, fixed_dt);
                            metrics_accumulator.record_dropped_ticks(dropped);
                            warn!(
                                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                                dropped_ticks = dropped,
                                max_ticks_per_frame,
                                "sim_clamp_triggered"
                            );
                        }

                        render_scene(&world, &mut surface);
                        pixels.frame_mut().copy_from_slice(surface.frame());
                        if let Err(error) = pixels.render() {
                            warn!(error = %error, "frame_present_failed");
                            window_target.exit();
                        }
                        metrics_accumulator.record_frame(raw_frame_dt);

                        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                            metrics_handle.publish(snapshot);
                            info!(
                                fps = snapshot.fps,
                                tps = snapshot.tps,
                                frame_time_ms = snapshot.frame_time_ms,
                                max_frame_ms = snapshot.max_frame_ms,
                                dropped_ticks = snapshot.dropped_ticks,
                                scene = world.active_scene().map(|scene| scene.name().to_string()),
                                "loop_metrics"
                            );
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                window_for_loop.request_redraw();
            }
            Event::LoopExiting => {
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Turns raw window events into queued `InputEvent`s. Click positions
/// are rescaled from window pixels to surface pixels so hit tests stay
/// correct after a resize.
#[derive(Debug)]
struct InputCollector {
    pending: Vec<InputEvent>,
    cursor_position_px: Option<(f32, f32)>,
    window_width: u32,
    window_height: u32,
    surface_width: u32,
    surface_height: u32,
}

impl InputCollector {
    fn new(
        window_width: u32,
        window_height: u32,
        geometry: &super::rendering::SurfaceGeometry,
    ) -> Self {
        Self {
            pending: Vec::new(),
            cursor_position_px: None,
            window_width: window_width.max(1),
            window_height: window_height.max(1),
            surface_width: geometry.width(),
            surface_height: geometry.height(),
        }
    }

    fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        if key_event.repeat {
            return;
        }
        let Some(key) = key_name(&key_event.logical_key) else {
            return;
        };
        let event = match key_event.state {
            ElementState::Pressed => InputEvent::KeyDown { key },
            ElementState::Released => InputEvent::KeyUp { key },
        };
        self.pending.push(event);
    }

    fn handle_mouse_input(&mut self, button: MouseButton, state: ElementState) {
        if button != MouseButton::Left || state != ElementState::Pressed {
            return;
        }
        let Some((x, y)) = self.cursor_position_px else {
            return;
        };
        self.pending.push(InputEvent::Click {
            x_px: rescale_axis(x, self.window_width, self.surface_width),
            y_px: rescale_axis(y, self.window_height, self.surface_height),
        });
    }

    fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_width = width.max(1);
        self.window_height = height.max(1);
    }

    fn set_cursor_position_px(&mut self, x: f32, y: f32) {
        self.cursor_position_px = Some((x, y));
    }

    fn clear_cursor_position(&mut self) {
        self.cursor_position_px = None;
    }

    fn drain(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.pending)
    }
}

/// Stable key name handed to keyboard bindings: the produced character
/// for printable keys, the named-key debug name ("Space", "ArrowUp")
/// otherwise.
fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Character(text) => Some(text.to_string()),
        Key::Named(named) => Some(format!("{named:?}")),
        _ => None,
    }
}

fn rescale_axis(value_px: f32, window_extent: u32, surface_extent: u32) -> f32 {
    value_px * surface_extent as f32 / window_extent.max(1) as f32
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn dropped_ticks_from_backlog(backlog: Duration, fixed_dt: Duration) -> u32 {
    if fixed_dt.is_zero() {
        return 0;
    }
    (backlog.as_secs_f64() / fixed_dt.as_secs_f64()) as u32
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
