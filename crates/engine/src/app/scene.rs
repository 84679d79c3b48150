use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::app::audio::{AudioHandle, AudioMixer};
use crate::app::entity::{
    CallbackError, Drawable, DrawableKind, EntityId, SpriteData, SquareData, TextData,
};
use crate::app::events::{BindingId, EventBinding, EventKind};
use crate::app::math::{Axis, Camera, Vec3};
use crate::app::rendering::{Color, DrawMode, SurfaceGeometry};

/// Stable handle to a registered scene. Scenes are never removed, so the
/// handle stays valid for the life of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub(crate) usize);

/// How a scene is addressed for loading: by registered name, by registry
/// index, or by the handle returned at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSelector {
    Name(String),
    Index(usize),
    Id(SceneId),
}

impl fmt::Display for SceneSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneSelector::Name(name) => write!(f, "name {name:?}"),
            SceneSelector::Index(index) => write!(f, "index {index}"),
            SceneSelector::Id(id) => write!(f, "id {}", id.0),
        }
    }
}

impl From<&str> for SceneSelector {
    fn from(name: &str) -> Self {
        SceneSelector::Name(name.to_string())
    }
}

impl From<String> for SceneSelector {
    fn from(name: String) -> Self {
        SceneSelector::Name(name)
    }
}

impl From<usize> for SceneSelector {
    fn from(index: usize) -> Self {
        SceneSelector::Index(index)
    }
}

impl From<SceneId> for SceneSelector {
    fn from(id: SceneId) -> Self {
        SceneSelector::Id(id)
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("no scene is active")]
    NoActiveScene,
    #[error("no scene matches {selector}")]
    UnknownScene { selector: String },
    #[error("no entity {0:?} in the active scene")]
    UnknownEntity(EntityId),
    #[error("push duration must be positive and finite, got {0}")]
    InvalidPushDuration(f32),
    #[error("tick rate must be positive and finite, got {0}")]
    InvalidTickRate(f32),
}

/// Simulation time. Advanced once per tick by `1 / tick_rate`; deferred
/// actions compare their deadline against `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldClock {
    pub seconds: f64,
    pub tick: u64,
}

pub type OnLoadCallback = Box<dyn FnMut(&mut SceneWorld)>;
pub type UpdateTask = Box<dyn FnMut(&mut SceneWorld) -> Result<(), CallbackError>>;

/// One-shot work scheduled by the impulse helpers. Owned by the scene
/// that scheduled it; cleared wholesale on unload.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DeferredAction {
    ResetVelocityAxis {
        entity: EntityId,
        axis: Axis,
        fire_at: f64,
    },
    SnapIfAtRest {
        entity: EntityId,
        destination: Vec3,
        fire_at: f64,
    },
}

impl DeferredAction {
    pub(crate) fn fire_at(&self) -> f64 {
        match self {
            DeferredAction::ResetVelocityAxis { fire_at, .. }
            | DeferredAction::SnapIfAtRest { fire_at, .. } => *fire_at,
        }
    }
}

/// A registered scene: its one-time load callback plus everything the
/// lifecycle must tear down on unload. Listings hold entity ids in
/// registration order; `drawables` is the backing storage.
pub struct Scene {
    name: String,
    pub(crate) on_load: Option<OnLoadCallback>,
    pub(crate) update_tasks: Vec<UpdateTask>,
    pub(crate) deferred: Vec<DeferredAction>,
    pub(crate) bindings: HashMap<EventKind, Vec<EventBinding>>,
    pub(crate) audio: Vec<Box<dyn AudioHandle>>,
    pub(crate) drawables: Vec<Drawable>,
    pub(crate) sprites: Vec<EntityId>,
    pub(crate) squares: Vec<EntityId>,
    pub(crate) texts: Vec<EntityId>,
    /// Bumped on unload and clear_intervals so an in-flight task pass
    /// knows its borrowed task list is stale.
    pub(crate) task_epoch: u64,
}

impl Scene {
    fn new(name: String, on_load: OnLoadCallback) -> Self {
        Self {
            name,
            on_load: Some(on_load),
            update_tasks: Vec::new(),
            deferred: Vec::new(),
            bindings: HashMap::new(),
            audio: Vec::new(),
            drawables: Vec::new(),
            sprites: Vec::new(),
            squares: Vec::new(),
            texts: Vec::new(),
            task_epoch: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sprite_ids(&self) -> &[EntityId] {
        &self.sprites
    }

    pub fn square_ids(&self) -> &[EntityId] {
        &self.squares
    }

    pub fn text_ids(&self) -> &[EntityId] {
        &self.texts
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    pub fn update_task_count(&self) -> usize {
        self.update_tasks.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn pending_action_count(&self) -> usize {
        self.deferred.len()
    }

    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }

    pub(crate) fn drawable(&self, id: EntityId) -> Option<&Drawable> {
        self.drawables.iter().find(|d| d.id == id)
    }

    pub(crate) fn drawable_mut(&mut self, id: EntityId) -> Option<&mut Drawable> {
        self.drawables.iter_mut().find(|d| d.id == id)
    }
}

/// The explicit simulation context: scene registry, active-scene
/// pointer, camera, projection settings, and the clock. Everything a
/// tick touches flows through this one value; there is no ambient
/// global state, so several worlds can coexist in one process.
pub struct SceneWorld {
    pub(crate) scenes: Vec<Scene>,
    pub(crate) active: Option<usize>,
    pub camera: Camera,
    pub(crate) geometry: SurfaceGeometry,
    pub background: Color,
    pub draw_mode: DrawMode,
    pub(crate) tick_rate: f32,
    pub clock: WorldClock,
    pub(crate) audio_mixer: AudioMixer,
    next_entity_id: u64,
    pub(crate) next_binding_id: u64,
}

impl SceneWorld {
    pub fn new(geometry: SurfaceGeometry) -> Self {
        Self {
            scenes: Vec::new(),
            active: None,
            camera: Camera::default(),
            geometry,
            background: Color::WHITE,
            draw_mode: DrawMode::Normal,
            tick_rate: 60.0,
            clock: WorldClock::default(),
            audio_mixer: AudioMixer::default(),
            next_entity_id: 1,
            next_binding_id: 1,
        }
    }

    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    pub fn tick_rate(&self) -> f32 {
        self.tick_rate
    }

    pub fn set_tick_rate(&mut self, tick_rate: f32) -> Result<(), SceneError> {
        if !tick_rate.is_finite() || tick_rate <= 0.0 {
            return Err(SceneError::InvalidTickRate(tick_rate));
        }
        self.tick_rate = tick_rate;
        Ok(())
    }

    pub fn audio_mixer(&self) -> &AudioMixer {
        &self.audio_mixer
    }

    pub fn audio_mixer_mut(&mut self) -> &mut AudioMixer {
        &mut self.audio_mixer
    }

    /// Registers a scene. Registration never activates it; call
    /// [`SceneWorld::load_scene`] for that.
    pub fn add_scene(
        &mut self,
        name: impl Into<String>,
        on_load: impl FnMut(&mut SceneWorld) + 'static,
    ) -> SceneId {
        let name = name.into();
        debug!(scene = %name, "scene_registered");
        self.scenes.push(Scene::new(name, Box::new(on_load)));
        SceneId(self.scenes.len() - 1)
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(id.0)
    }

    pub fn scene_by_name(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.name == name)
    }

    pub fn active_scene(&self) -> Option<&Scene> {
        self.active.map(|index| &self.scenes[index])
    }

    pub fn active_scene_id(&self) -> Option<SceneId> {
        self.active.map(SceneId)
    }

    pub(crate) fn active_scene_mut(&mut self) -> Option<&mut Scene> {
        self.active.map(|index| &mut self.scenes[index])
    }

    /// Switches the active scene. The outgoing scene loses every
    /// periodic task, deferred action, and event binding; its audio is
    /// paused and its listings are emptied. The scene object itself
    /// stays registered and can be reloaded later, starting from empty
    /// listings. An unresolvable selector is an error and leaves the
    /// current scene untouched.
    pub fn load_scene(&mut self, selector: impl Into<SceneSelector>) -> Result<(), SceneError> {
        let selector = selector.into();
        let index = self.resolve_selector(&selector)?;
        if let Some(current) = self.active {
            self.unload_scene(current);
        }
        self.active = Some(index);
        info!(scene = %self.scenes[index].name, "scene_loaded");
        if let Some(mut on_load) = self.scenes[index].on_load.take() {
            on_load(self);
            self.scenes[index].on_load = Some(on_load);
        }
        Ok(())
    }

    fn resolve_selector(&self, selector: &SceneSelector) -> Result<usize, SceneError> {
        let index = match selector {
            SceneSelector::Name(name) => self.scenes.iter().position(|s| s.name == *name),
            SceneSelector::Index(index) => (*index < self.scenes.len()).then_some(*index),
            SceneSelector::Id(id) => (id.0 < self.scenes.len()).then_some(id.0),
        };
        index.ok_or_else(|| SceneError::UnknownScene {
            selector: selector.to_string(),
        })
    }

    fn unload_scene(&mut self, index: usize) {
        let scene = &mut self.scenes[index];
        scene.task_epoch = scene.task_epoch.wrapping_add(1);
        let dropped_tasks = scene.update_tasks.len();
        let dropped_bindings: usize = scene.bindings.values().map(Vec::len).sum();
        scene.update_tasks.clear();
        scene.deferred.clear();
        scene.bindings.clear();
        for audio in &mut scene.audio {
            audio.pause();
        }
        scene.audio.clear();
        scene.drawables.clear();
        scene.sprites.clear();
        scene.squares.clear();
        scene.texts.clear();
        info!(
            scene = %scene.name,
            dropped_tasks,
            dropped_bindings,
            "scene_unloaded"
        );
    }

    fn spawn(
        &mut self,
        position: Vec3,
        size: Vec3,
        kind: DrawableKind,
    ) -> Result<EntityId, SceneError> {
        let Some(index) = self.active else {
            return Err(SceneError::NoActiveScene);
        };
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;

        let scene = &mut self.scenes[index];
        match &kind {
            DrawableKind::Sprite(_) => scene.sprites.push(id),
            DrawableKind::Square(_) => scene.squares.push(id),
            DrawableKind::Text(_) => scene.texts.push(id),
        }
        scene.drawables.push(Drawable::new(id, position, size, kind));
        Ok(id)
    }

    /// Spawns a sprite into the active scene. Construction always
    /// targets whatever scene is active at this instant.
    pub fn spawn_sprite(
        &mut self,
        image: impl Into<String>,
        position: Vec3,
        size: Vec3,
    ) -> Result<EntityId, SceneError> {
        self.spawn(position, size, DrawableKind::Sprite(SpriteData::new(image)))
    }

    pub fn spawn_square(&mut self, position: Vec3, size: Vec3) -> Result<EntityId, SceneError> {
        self.spawn(position, size, DrawableKind::Square(SquareData::default()))
    }

    pub fn spawn_text(
        &mut self,
        text: impl Into<String>,
        position: Vec3,
        size: Vec3,
    ) -> Result<EntityId, SceneError> {
        self.spawn(position, size, DrawableKind::Text(TextData::new(text)))
    }

    pub fn drawable(&self, id: EntityId) -> Option<&Drawable> {
        self.active_scene().and_then(|scene| scene.drawable(id))
    }

    pub fn drawable_mut(&mut self, id: EntityId) -> Option<&mut Drawable> {
        self.active_scene_mut().and_then(|scene| scene.drawable_mut(id))
    }

    /// Removes an entity from every listing of its scene. Returns false
    /// when the id does not resolve, which is not an error: destroying
    /// twice is a no-op.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        let Some(scene) = self.active_scene_mut() else {
            return false;
        };
        let before = scene.drawables.len();
        scene.drawables.retain(|d| d.id != id);
        scene.sprites.retain(|&s| s != id);
        scene.squares.retain(|&s| s != id);
        scene.texts.retain(|&s| s != id);
        let removed = scene.drawables.len() != before;
        if removed {
            debug!(entity = id.0, "entity_destroyed");
        }
        removed
    }

    /// Registers a per-tick user task on the active scene. Tasks run
    /// every tick until [`SceneWorld::clear_intervals`] or unload.
    pub fn update(
        &mut self,
        task: impl FnMut(&mut SceneWorld) -> Result<(), CallbackError> + 'static,
    ) -> Result<(), SceneError> {
        let scene = self.active_scene_mut().ok_or(SceneError::NoActiveScene)?;
        scene.update_tasks.push(Box::new(task));
        Ok(())
    }

    /// Drops every user task of the active scene. No-op without an
    /// active scene or when no tasks exist.
    pub fn clear_intervals(&mut self) {
        if let Some(scene) = self.active_scene_mut() {
            scene.task_epoch = scene.task_epoch.wrapping_add(1);
            scene.update_tasks.clear();
        }
    }

    pub fn add_audio(&mut self, handle: Box<dyn AudioHandle>) -> Result<(), SceneError> {
        let scene = self.active_scene_mut().ok_or(SceneError::NoActiveScene)?;
        scene.audio.push(handle);
        Ok(())
    }

    pub(crate) fn allocate_binding_id(&mut self) -> BindingId {
        let id = BindingId(self.next_binding_id);
        self.next_binding_id += 1;
        id
    }
}
