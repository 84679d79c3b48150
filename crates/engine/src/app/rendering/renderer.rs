use std::collections::HashMap;
use std::path::PathBuf;

use image::ImageReader;
use tracing::warn;

use crate::app::entity::{Drawable, DrawableKind, EntityId};
use crate::app::math::Vec3;
use crate::app::scene::SceneWorld;

use super::surface::{Color, DrawingSurface, Font, Paint, SurfaceError};
use super::transform::{project, SurfaceGeometry};

const GLYPH_WIDTH: usize = 3;
const GLYPH_HEIGHT: usize = 5;

/// Draws the active scene: clear to the world background, then the
/// sprite, square, and text listings in listing order. Hidden or
/// inactive entities are skipped; a draw failure is logged per entity
/// and never blanks the rest of the frame. There is no depth sort.
pub fn render_scene(world: &SceneWorld, surface: &mut dyn DrawingSurface) {
    surface.clear(world.background);
    let Some(scene) = world.active_scene() else {
        return;
    };

    let passes: [&[EntityId]; 3] = [scene.sprite_ids(), scene.square_ids(), scene.text_ids()];
    for listing in passes {
        for &id in listing {
            let Some(drawable) = scene_drawable(world, id) else {
                continue;
            };
            if drawable.hidden || !drawable.active {
                continue;
            }
            if let Err(error) = draw_entity(world, drawable, surface) {
                warn!(
                    entity = id.0,
                    kind = drawable.kind.name(),
                    %error,
                    "render_entity_failed"
                );
            }
        }
    }
}

fn scene_drawable(world: &SceneWorld, id: EntityId) -> Option<&Drawable> {
    world.active_scene().and_then(|scene| scene.drawable(id))
}

fn draw_entity(
    world: &SceneWorld,
    drawable: &Drawable,
    surface: &mut dyn DrawingSurface,
) -> Result<(), SurfaceError> {
    let geometry = world.geometry();
    let origin = project(drawable.position, drawable.size, world.draw_mode, geometry);
    let rotation = drawable.rotation.z;

    match &drawable.kind {
        DrawableKind::Sprite(sprite) => {
            let size_px = falloff_size_px(world, drawable.size);
            surface.draw_image(&sprite.image, origin, size_px, rotation, drawable.flip)
        }
        DrawableKind::Square(square) => {
            let size_px = falloff_size_px(world, drawable.size);
            if drawable.stroke {
                surface.stroke_rect(origin, size_px, rotation, &square.paint)
            } else {
                surface.fill_rect(origin, size_px, rotation, &square.paint)
            }
        }
        DrawableKind::Text(text) => {
            if drawable.stroke {
                surface.stroke_text(&text.text, origin, rotation, &text.font, text.color)
            } else {
                surface.fill_text(&text.text, origin, rotation, &text.font, text.color)
            }
        }
    }
}

/// Pixel size under the camera's depth falloff and zoom divisor. An
/// entity behind the camera's depth plane collapses to zero and draws
/// nothing.
fn falloff_size_px(world: &SceneWorld, size: Vec3) -> Vec3 {
    let scale = world.geometry().units_per_pixel();
    let depth = world.camera.position.z;
    let zoom = world.camera.size;
    Vec3::new(
        (size.x - depth).max(0.0) / zoom * scale.x,
        (size.y - depth).max(0.0) / zoom * scale.y,
        (size.z - depth).max(0.0) / zoom * scale.z,
    )
}

struct LoadedImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

/// Software implementation of [`DrawingSurface`] over an RGBA frame.
/// Image keys resolve to `<asset_root>/<key>.png`, decoded once and
/// cached; a key that fails to load is reported once and then skipped.
pub struct PixelSurface {
    width: u32,
    height: u32,
    frame: Vec<u8>,
    asset_root: PathBuf,
    image_cache: HashMap<String, Option<LoadedImage>>,
}

impl PixelSurface {
    pub fn new(geometry: &SurfaceGeometry, asset_root: PathBuf) -> Self {
        let width = geometry.width();
        let height = geometry.height();
        Self {
            width,
            height,
            frame: vec![0; width as usize * height as usize * 4],
            asset_root,
            image_cache: HashMap::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    fn write_pixel_clipped(&mut self, x: i32, y: i32, color: Color) {
        if color.a == 0 {
            return;
        }
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        if offset + 4 <= self.frame.len() {
            self.frame[offset..offset + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    }

    fn load_image(&mut self, key: &str) -> Result<bool, SurfaceError> {
        if self.image_cache.contains_key(key) {
            return Ok(self.image_cache[key].is_some());
        }
        let path = self.asset_root.join(format!("{key}.png"));
        let decoded = ImageReader::open(&path)
            .map_err(image::ImageError::IoError)
            .and_then(|reader| reader.decode());
        match decoded {
            Ok(dynamic) => {
                let rgba = dynamic.to_rgba8();
                self.image_cache.insert(
                    key.to_string(),
                    Some(LoadedImage {
                        width: rgba.width(),
                        height: rgba.height(),
                        rgba: rgba.into_raw(),
                    }),
                );
                Ok(true)
            }
            Err(source) => {
                // remember the failure so one bad key reports once, not
                // once per frame
                self.image_cache.insert(key.to_string(), None);
                Err(SurfaceError::ImageLoad {
                    key: key.to_string(),
                    path,
                    source,
                })
            }
        }
    }

    /// Visits every frame pixel covered by the rect rotated by
    /// `rotation_z` degrees about `origin`, handing the callback the
    /// pixel plus the unrotated local fractions in `0..1`.
    fn for_each_rect_pixel(
        &mut self,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        mut visit: impl FnMut(&mut Self, i32, i32, f32, f32),
    ) -> Result<(), SurfaceError> {
        let (w, h) = (size_px.x, size_px.y);
        if !w.is_finite() || !h.is_finite() || w < 0.0 || h < 0.0 {
            return Err(SurfaceError::DegenerateSize {
                width: w,
                height: h,
            });
        }
        if w < 1.0 || h < 1.0 {
            return Ok(());
        }

        let radians = rotation_z.to_radians();
        let (sin, cos) = radians.sin_cos();

        // AABB of the rotated corners, clipped to the frame
        let corners = [
            (0.0f32, 0.0f32),
            (w, 0.0),
            (0.0, h),
            (w, h),
        ];
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for (cx, cy) in corners {
            let rx = origin.x + cx * cos - cy * sin;
            let ry = origin.y + cx * sin + cy * cos;
            min_x = min_x.min(rx);
            min_y = min_y.min(ry);
            max_x = max_x.max(rx);
            max_y = max_y.max(ry);
        }
        let start_x = (min_x.floor() as i32).max(0);
        let start_y = (min_y.floor() as i32).max(0);
        let end_x = (max_x.ceil() as i32).min(self.width as i32);
        let end_y = (max_y.ceil() as i32).min(self.height as i32);

        for py in start_y..end_y {
            for px in start_x..end_x {
                let dx = px as f32 + 0.5 - origin.x;
                let dy = py as f32 + 0.5 - origin.y;
                // inverse rotation back into local rect space
                let lx = dx * cos + dy * sin;
                let ly = -dx * sin + dy * cos;
                if lx >= 0.0 && lx < w && ly >= 0.0 && ly < h {
                    visit(self, px, py, lx / w, ly / h);
                }
            }
        }
        Ok(())
    }

    fn draw_glyph_run(
        &mut self,
        text: &str,
        origin: Vec3,
        rotation_z: f32,
        font: &Font,
        color: Color,
    ) {
        let cell = ((font.size_px / GLYPH_HEIGHT as f32).round() as i32).max(1);
        let advance = (GLYPH_WIDTH as i32 + 1) * cell;
        let radians = rotation_z.to_radians();
        let (sin, cos) = radians.sin_cos();

        let mut pen_x = 0i32;
        for ch in text.chars() {
            let rows = glyph_rows(ch);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for sy in 0..cell {
                        for sx in 0..cell {
                            let local_x = (pen_x + col as i32 * cell + sx) as f32;
                            let local_y = (row as i32 * cell + sy) as f32;
                            let px = origin.x + local_x * cos - local_y * sin;
                            let py = origin.y + local_x * sin + local_y * cos;
                            self.write_pixel_clipped(
                                px.round() as i32,
                                py.round() as i32,
                                color,
                            );
                        }
                    }
                }
            }
            pen_x += advance;
        }
    }
}

impl DrawingSurface for PixelSurface {
    fn clear(&mut self, color: Color) {
        for pixel in self.frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    }

    fn fill_rect(
        &mut self,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        paint: &Paint,
    ) -> Result<(), SurfaceError> {
        let paint = paint.clone();
        self.for_each_rect_pixel(origin, size_px, rotation_z, |surface, px, py, u, _v| {
            let color = match &paint {
                Paint::Solid(color) => *color,
                Paint::Gradient(gradient) => gradient.sample(u),
            };
            surface.write_pixel_clipped(px, py, color);
        })
    }

    fn stroke_rect(
        &mut self,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        paint: &Paint,
    ) -> Result<(), SurfaceError> {
        let color = paint.edge_color();
        let (w, h) = (size_px.x, size_px.y);
        self.for_each_rect_pixel(origin, size_px, rotation_z, |surface, px, py, u, v| {
            let lx = u * w;
            let ly = v * h;
            if lx < 1.0 || lx >= w - 1.0 || ly < 1.0 || ly >= h - 1.0 {
                surface.write_pixel_clipped(px, py, color);
            }
        })
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Vec3,
        rotation_z: f32,
        font: &Font,
        color: Color,
    ) -> Result<(), SurfaceError> {
        self.draw_glyph_run(text, origin, rotation_z, font, color);
        Ok(())
    }

    fn stroke_text(
        &mut self,
        text: &str,
        origin: Vec3,
        rotation_z: f32,
        font: &Font,
        color: Color,
    ) -> Result<(), SurfaceError> {
        // the bitmap font has no outline form; stroke renders the same
        // glyphs
        self.draw_glyph_run(text, origin, rotation_z, font, color);
        Ok(())
    }

    fn draw_image(
        &mut self,
        key: &str,
        origin: Vec3,
        size_px: Vec3,
        rotation_z: f32,
        flip: Vec3,
    ) -> Result<(), SurfaceError> {
        if !self.load_image(key)? {
            // failure already reported when the cache entry was created
            return Ok(());
        }
        // lift the decoded image out of the cache so the blit can borrow
        // the frame mutably
        let Some(Some(loaded)) = self.image_cache.remove(key) else {
            return Ok(());
        };
        let flip_x = flip.x < 0.0;
        let flip_y = flip.y < 0.0;
        let (img_w, img_h) = (loaded.width, loaded.height);
        let result =
            self.for_each_rect_pixel(origin, size_px, rotation_z, |surface, px, py, u, v| {
                let u = if flip_x { 1.0 - u } else { u };
                let v = if flip_y { 1.0 - v } else { v };
                let sx = ((u * img_w as f32) as u32).min(img_w - 1);
                let sy = ((v * img_h as f32) as u32).min(img_h - 1);
                let offset = (sy as usize * img_w as usize + sx as usize) * 4;
                let texel = Color::rgba(
                    loaded.rgba[offset],
                    loaded.rgba[offset + 1],
                    loaded.rgba[offset + 2],
                    loaded.rgba[offset + 3],
                );
                if texel.a > 0 {
                    surface.write_pixel_clipped(px, py, texel);
                }
            });
        self.image_cache.insert(key.to_string(), Some(loaded));
        result
    }
}

/// 3x5 bitmaps for printable ASCII, indexed by `ch - 32`. Unknown
/// characters render as a blank cell.
#[rustfmt::skip]
const GLYPH_TABLE: [[u8; GLYPH_HEIGHT]; 95] = [
    [0b000, 0b000, 0b000, 0b000, 0b000], // space
    [0b010, 0b010, 0b010, 0b000, 0b010], // !
    [0b101, 0b101, 0b000, 0b000, 0b000], // "
    [0b101, 0b111, 0b101, 0b111, 0b101], // #
    [0b111, 0b110, 0b111, 0b011, 0b111], // $
    [0b101, 0b001, 0b010, 0b100, 0b101], // %
    [0b010, 0b101, 0b010, 0b101, 0b011], // &
    [0b010, 0b010, 0b000, 0b000, 0b000], // '
    [0b001, 0b010, 0b010, 0b010, 0b001], // (
    [0b100, 0b010, 0b010, 0b010, 0b100], // )
    [0b000, 0b101, 0b010, 0b101, 0b000], // *
    [0b000, 0b010, 0b111, 0b010, 0b000], // +
    [0b000, 0b000, 0b000, 0b010, 0b100], // ,
    [0b000, 0b000, 0b111, 0b000, 0b000], // -
    [0b000, 0b000, 0b000, 0b000, 0b010], // .
    [0b001, 0b001, 0b010, 0b100, 0b100], // /
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b010, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
    [0b000, 0b010, 0b000, 0b010, 0b000], // :
    [0b000, 0b010, 0b000, 0b010, 0b100], // ;
    [0b001, 0b010, 0b100, 0b010, 0b001], // <
    [0b000, 0b111, 0b000, 0b111, 0b000], // =
    [0b100, 0b010, 0b001, 0b010, 0b100], // >
    [0b111, 0b001, 0b011, 0b000, 0b010], // ?
    [0b111, 0b101, 0b111, 0b100, 0b111], // @
    [0b010, 0b101, 0b111, 0b101, 0b101], // A
    [0b110, 0b101, 0b110, 0b101, 0b110], // B
    [0b111, 0b100, 0b100, 0b100, 0b111], // C
    [0b110, 0b101, 0b101, 0b101, 0b110], // D
    [0b111, 0b100, 0b110, 0b100, 0b111], // E
    [0b111, 0b100, 0b110, 0b100, 0b100], // F
    [0b111, 0b100, 0b101, 0b101, 0b111], // G
    [0b101, 0b101, 0b111, 0b101, 0b101], // H
    [0b111, 0b010, 0b010, 0b010, 0b111], // I
    [0b111, 0b001, 0b001, 0b101, 0b111], // J
    [0b101, 0b101, 0b110, 0b101, 0b101], // K
    [0b100, 0b100, 0b100, 0b100, 0b111], // L
    [0b101, 0b111, 0b111, 0b101, 0b101], // M
    [0b101, 0b111, 0b111, 0b111, 0b101], // N
    [0b111, 0b101, 0b101, 0b101, 0b111], // O
    [0b110, 0b101, 0b110, 0b100, 0b100], // P
    [0b111, 0b101, 0b101, 0b111, 0b001], // Q
    [0b110, 0b101, 0b110, 0b101, 0b101], // R
    [0b111, 0b100, 0b111, 0b001, 0b111], // S
    [0b111, 0b010, 0b010, 0b010, 0b010], // T
    [0b101, 0b101, 0b101, 0b101, 0b111], // U
    [0b101, 0b101, 0b101, 0b101, 0b010], // V
    [0b101, 0b101, 0b111, 0b111, 0b101], // W
    [0b101, 0b101, 0b010, 0b101, 0b101], // X
    [0b101, 0b101, 0b010, 0b010, 0b010], // Y
    [0b111, 0b001, 0b010, 0b100, 0b111], // Z
    [0b110, 0b100, 0b100, 0b100, 0b110], // [
    [0b100, 0b100, 0b010, 0b001, 0b001], // backslash
    [0b011, 0b001, 0b001, 0b001, 0b011], // ]
    [0b010, 0b101, 0b000, 0b000, 0b000], // ^
    [0b000, 0b000, 0b000, 0b000, 0b111], // _
    [0b100, 0b010, 0b000, 0b000, 0b000], // `
    [0b000, 0b111, 0b001, 0b111, 0b111], // a
    [0b100, 0b100, 0b110, 0b101, 0b110], // b
    [0b000, 0b111, 0b100, 0b100, 0b111], // c
    [0b001, 0b001, 0b111, 0b101, 0b111], // d
    [0b000, 0b111, 0b110, 0b100, 0b111], // e
    [0b011, 0b100, 0b110, 0b100, 0b100], // f
    [0b000, 0b111, 0b101, 0b111, 0b001], // g
    [0b100, 0b100, 0b110, 0b101, 0b101], // h
    [0b010, 0b000, 0b010, 0b010, 0b010], // i
    [0b001, 0b000, 0b001, 0b101, 0b010], // j
    [0b100, 0b101, 0b110, 0b101, 0b101], // k
    [0b100, 0b100, 0b100, 0b100, 0b111], // l
    [0b000, 0b110, 0b111, 0b101, 0b101], // m
    [0b000, 0b110, 0b101, 0b101, 0b101], // n
    [0b000, 0b111, 0b101, 0b101, 0b111], // o
    [0b000, 0b110, 0b101, 0b110, 0b100], // p
    [0b000, 0b111, 0b101, 0b111, 0b001], // q
    [0b000, 0b110, 0b101, 0b100, 0b100], // r
    [0b000, 0b111, 0b110, 0b001, 0b111], // s
    [0b010, 0b111, 0b010, 0b010, 0b011], // t
    [0b000, 0b101, 0b101, 0b101, 0b111], // u
    [0b000, 0b101, 0b101, 0b101, 0b010], // v
    [0b000, 0b101, 0b101, 0b111, 0b010], // w
    [0b000, 0b101, 0b010, 0b010, 0b101], // x
    [0b000, 0b101, 0b101, 0b111, 0b001], // y
    [0b000, 0b111, 0b001, 0b010, 0b111], // z
    [0b011, 0b010, 0b110, 0b010, 0b011], // {
    [0b010, 0b010, 0b010, 0b010, 0b010], // |
    [0b110, 0b010, 0b011, 0b010, 0b110], // }
    [0b000, 0b011, 0b110, 0b000, 0b000], // ~
];

fn glyph_rows(ch: char) -> [u8; GLYPH_HEIGHT] {
    let code = ch as u32;
    if (32..=126).contains(&code) {
        GLYPH_TABLE[(code - 32) as usize]
    } else {
        GLYPH_TABLE[0]
    }
}
