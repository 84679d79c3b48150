use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

use crate::app::math::Vec3;
use crate::app::rendering::{Color, Font, Paint};
use crate::app::scene::SceneWorld;

/// Process-unique entity handle. Ids are never reused, so a stale handle
/// held across a destroy or scene switch simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Error a host-supplied callback reports back to the engine. The tick
/// logs it and moves on; it never aborts the pass.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Invoked when the scanning entity overlaps a sprite whose tag it
/// registered. Arguments are the scanning entity then the candidate.
pub type CollisionCallback =
    Box<dyn FnMut(&mut SceneWorld, EntityId, EntityId) -> Result<(), CallbackError>>;

pub type ClickCallback = Box<dyn FnMut(&mut SceneWorld, EntityId) -> Result<(), CallbackError>>;

pub const DEFAULT_TAG: &str = "none";
pub const DEFAULT_SQUARE_COLOR: Color = Color::rgb(230, 230, 230);
pub const DEFAULT_ANIMATION_SPEED: f32 = 12.0;

/// Shared state of every visual object. One record per entity; the
/// variant payload lives in `kind`.
pub struct Drawable {
    pub id: EntityId,
    pub tag: String,
    pub classes: BTreeSet<String>,
    pub hidden: bool,
    pub active: bool,
    pub position: Vec3,
    pub size: Vec3,
    pub flip: Vec3,
    pub rotation: Vec3,
    /// Declared offset for the collision box. Carried but not applied by
    /// the detector, which tests `[position, position + collision_end]`.
    pub collision_start: Vec3,
    /// Extent of the collision box. Defaults to `size` at construction
    /// but stays independently mutable afterwards.
    pub collision_end: Vec3,
    pub collide_with_tag: HashMap<String, CollisionCallback>,
    pub rigidbody: bool,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub is_gui: bool,
    pub stroke: bool,
    pub kind: DrawableKind,
}

impl Drawable {
    pub(crate) fn new(id: EntityId, position: Vec3, size: Vec3, kind: DrawableKind) -> Self {
        Self {
            id,
            tag: DEFAULT_TAG.to_string(),
            classes: BTreeSet::new(),
            hidden: false,
            active: true,
            position,
            size,
            flip: Vec3::new(1.0, 1.0, 1.0),
            rotation: Vec3::ZERO,
            collision_start: Vec3::ZERO,
            collision_end: size,
            collide_with_tag: HashMap::new(),
            rigidbody: false,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            is_gui: false,
            stroke: false,
            kind,
        }
    }

    /// Registers a collision callback for sprites carrying `tag`.
    /// Binding is by tag, not by reference; any sprite that carries the
    /// tag at scan time participates.
    pub fn collide_with(
        &mut self,
        tag: impl Into<String>,
        callback: impl FnMut(&mut SceneWorld, EntityId, EntityId) -> Result<(), CallbackError> + 'static,
    ) {
        self.collide_with_tag.insert(tag.into(), Box::new(callback));
    }

    pub fn has_click_handler(&self) -> bool {
        match &self.kind {
            DrawableKind::Sprite(sprite) => sprite.on_click.is_some(),
            DrawableKind::Square(square) => square.on_click.is_some(),
            DrawableKind::Text(_) => false,
        }
    }

    pub(crate) fn click_slot(&mut self) -> Option<&mut Option<ClickCallback>> {
        match &mut self.kind {
            DrawableKind::Sprite(sprite) => Some(&mut sprite.on_click),
            DrawableKind::Square(square) => Some(&mut square.on_click),
            DrawableKind::Text(_) => None,
        }
    }

    pub fn sprite(&self) -> Option<&SpriteData> {
        match &self.kind {
            DrawableKind::Sprite(sprite) => Some(sprite),
            _ => None,
        }
    }

    pub fn sprite_mut(&mut self) -> Option<&mut SpriteData> {
        match &mut self.kind {
            DrawableKind::Sprite(sprite) => Some(sprite),
            _ => None,
        }
    }
}

impl fmt::Debug for Drawable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drawable")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("kind", &self.kind.name())
            .finish_non_exhaustive()
    }
}

pub enum DrawableKind {
    Sprite(SpriteData),
    Square(SquareData),
    Text(TextData),
}

impl DrawableKind {
    pub fn name(&self) -> &'static str {
        match self {
            DrawableKind::Sprite(_) => "sprite",
            DrawableKind::Square(_) => "square",
            DrawableKind::Text(_) => "text",
        }
    }
}

pub struct SpriteData {
    /// Current image key, resolved by the drawing surface's image cache.
    pub image: String,
    /// Named animation tracks; each is an ordered list of image keys.
    pub animation_on: HashMap<String, Vec<String>>,
    /// Tracks advanced by the animation pass. Names absent from
    /// `animation_on` are ignored.
    pub active_animations: BTreeSet<String>,
    /// Track steps per second, independent of the tick rate.
    pub animation_speed: f32,
    /// One counter shared by all active tracks, so concurrent tracks are
    /// not independently phased.
    pub animation_frame: u64,
    pub(crate) animation_accumulator: f32,
    pub on_click: Option<ClickCallback>,
}

impl SpriteData {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            animation_on: HashMap::new(),
            active_animations: BTreeSet::new(),
            animation_speed: DEFAULT_ANIMATION_SPEED,
            animation_frame: 0,
            animation_accumulator: 0.0,
            on_click: None,
        }
    }
}

pub struct SquareData {
    pub paint: Paint,
    pub on_click: Option<ClickCallback>,
}

impl Default for SquareData {
    fn default() -> Self {
        Self {
            paint: Paint::Solid(DEFAULT_SQUARE_COLOR),
            on_click: None,
        }
    }
}

pub struct TextData {
    pub text: String,
    pub color: Color,
    pub font: Font,
}

impl TextData {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: Color::BLACK,
            font: Font::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_end_defaults_to_size() {
        let size = Vec3::new(0.5, 0.5, 0.0);
        let drawable = Drawable::new(
            EntityId(1),
            Vec3::ZERO,
            size,
            DrawableKind::Square(SquareData::default()),
        );
        assert_eq!(drawable.collision_end, size);
        assert_eq!(drawable.collision_start, Vec3::ZERO);
        assert_eq!(drawable.tag, DEFAULT_TAG);
        assert!(drawable.active);
        assert!(!drawable.hidden);
    }

    #[test]
    fn square_defaults_to_light_grey_solid_paint() {
        let square = SquareData::default();
        assert_eq!(square.paint, Paint::Solid(Color::rgb(230, 230, 230)));
    }

    #[test]
    fn text_defaults_to_fifteen_pixel_font() {
        let text = TextData::new("hello");
        assert_eq!(text.font.size_px, 15.0);
        assert_eq!(text.color, Color::BLACK);
    }

    #[test]
    fn click_handler_detection_covers_variants() {
        let mut sprite = Drawable::new(
            EntityId(1),
            Vec3::ZERO,
            Vec3::splat(1.0),
            DrawableKind::Sprite(SpriteData::new("idle")),
        );
        assert!(!sprite.has_click_handler());
        if let Some(slot) = sprite.click_slot() {
            *slot = Some(Box::new(|_, _| Ok(())));
        }
        assert!(sprite.has_click_handler());

        let mut text = Drawable::new(
            EntityId(2),
            Vec3::ZERO,
            Vec3::splat(1.0),
            DrawableKind::Text(TextData::new("label")),
        );
        assert!(text.click_slot().is_none());
    }
}
