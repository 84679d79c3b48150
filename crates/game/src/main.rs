use std::cell::Cell;
use std::rc::Rc;

use sceneloop::{
    load_config, run_app, CallbackError, Color, DrawableKind, GradientStop, LinearGradient,
    LoopConfig, Paint, SceneWorld, SurfaceGeometry, Vec3,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PLAYER_SPEED: f32 = 3.0;
const COIN_TAG: &str = "coin";
const WALK_ANIMATION: &str = "walk";
const PLAYER_IDLE_IMAGE: &str = "hero_idle";

fn main() {
    init_tracing();
    info!("=== Coin Chase Startup ===");

    let loaded = match load_config() {
        Ok(loaded) => loaded,
        Err(err) => {
            error!(error = %err, "startup_failed");
            std::process::exit(1);
        }
    };
    let (config, mut world) = match loaded {
        Some(app_config) => match app_config.build() {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "startup_failed");
                std::process::exit(1);
            }
        },
        None => (LoopConfig::default(), default_world()),
    };

    register_scenes(&mut world);
    if let Err(err) = world.load_scene("menu") {
        error!(error = %err, "startup_failed");
        std::process::exit(1);
    }

    if let Err(err) = run_app(config, world) {
        error!(error = %err, "startup_failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn default_world() -> SceneWorld {
    let geometry =
        SurfaceGeometry::new(500, 500, Vec3::splat(100.0)).expect("constant geometry is valid");
    SceneWorld::new(geometry)
}

fn register_scenes(world: &mut SceneWorld) {
    world.add_scene("menu", load_menu);
    world.add_scene("level", load_level);
}

fn load_menu(world: &mut SceneWorld) {
    world.background = Color::rgb(29, 35, 48);

    let title = world
        .spawn_text("COIN CHASE", Vec3::new(1.4, 3.6, 0.0), Vec3::new(2.2, 0.4, 0.0))
        .expect("menu scene is active");
    if let Some(drawable) = world.drawable_mut(title) {
        if let DrawableKind::Text(text) = &mut drawable.kind {
            text.color = Color::WHITE;
            text.font.size_px = 40.0;
        }
    }

    let prompt = world
        .spawn_text(
            "CLICK START OR PRESS SPACE",
            Vec3::new(1.1, 2.9, 0.0),
            Vec3::new(2.8, 0.2, 0.0),
        )
        .expect("menu scene is active");
    if let Some(drawable) = world.drawable_mut(prompt) {
        if let DrawableKind::Text(text) = &mut drawable.kind {
            text.color = Color::rgb(170, 180, 200);
        }
    }

    let button = world
        .spawn_square(Vec3::new(1.75, 1.75, 0.0), Vec3::new(1.5, 0.75, 0.0))
        .expect("menu scene is active");
    if let Some(drawable) = world.drawable_mut(button) {
        if let DrawableKind::Square(square) = &mut drawable.kind {
            square.paint = start_button_paint();
            square.on_click = Some(Box::new(|world, _| {
                world
                    .load_scene("level")
                    .map_err(|err| CallbackError::new(err.to_string()))
            }));
        }
    }

    world
        .keyboard_on_down(|world, key| {
            if key == "Space" {
                world
                    .load_scene("level")
                    .map_err(|err| CallbackError::new(err.to_string()))?;
            }
            Ok(())
        })
        .expect("menu scene is active");
}

fn start_button_paint() -> Paint {
    LinearGradient::new(vec![
        GradientStop {
            offset: 0.0,
            color: Color::rgb(70, 130, 180),
        },
        GradientStop {
            offset: 1.0,
            color: Color::rgb(25, 60, 90),
        },
    ])
    .map(Paint::Gradient)
    .expect("constant gradient stops are valid")
}

fn load_level(world: &mut SceneWorld) {
    world.background = Color::rgb(240, 244, 248);
    let score = Rc::new(Cell::new(0u32));

    let player = world
        .spawn_sprite(
            PLAYER_IDLE_IMAGE,
            Vec3::new(2.25, 0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
        )
        .expect("level scene is active");
    if let Some(drawable) = world.drawable_mut(player) {
        drawable.rigidbody = true;
        if let Some(sprite) = drawable.sprite_mut() {
            sprite.animation_on.insert(
                WALK_ANIMATION.to_string(),
                vec!["hero_walk_0".to_string(), "hero_walk_1".to_string()],
            );
        }
    }

    for (index, x) in [0.8f32, 2.4, 4.0].into_iter().enumerate() {
        let coin = world
            .spawn_sprite(
                "coin",
                Vec3::new(x, 2.0 + index as f32 * 0.4, 0.0),
                Vec3::new(0.3, 0.3, 0.0),
            )
            .expect("level scene is active");
        if let Some(drawable) = world.drawable_mut(coin) {
            drawable.tag = COIN_TAG.to_string();
        }
    }

    let score_text = world
        .spawn_text("SCORE 0", Vec3::new(0.2, 4.5, 0.0), Vec3::new(1.2, 0.25, 0.0))
        .expect("level scene is active");

    let collected = score.clone();
    if let Some(drawable) = world.drawable_mut(player) {
        drawable.collide_with(COIN_TAG, move |world, _player, coin| {
            world.destroy(coin);
            collected.set(collected.get() + 1);
            Ok(())
        });
    }

    let hud_score = score;
    world
        .update(move |world| {
            if let Some(drawable) = world.drawable_mut(score_text) {
                if let DrawableKind::Text(text) = &mut drawable.kind {
                    text.text = format!("SCORE {}", hud_score.get());
                }
            }
            Ok(())
        })
        .expect("level scene is active");

    world
        .keyboard_on_down(move |world, key| {
            if key == "Escape" {
                return world
                    .load_scene("menu")
                    .map_err(|err| CallbackError::new(err.to_string()));
            }
            let Some(drawable) = world.drawable_mut(player) else {
                return Ok(());
            };
            match key {
                "a" | "ArrowLeft" => {
                    drawable.velocity.x = -PLAYER_SPEED;
                    drawable.flip.x = -1.0;
                    start_walk(drawable);
                }
                "d" | "ArrowRight" => {
                    drawable.velocity.x = PLAYER_SPEED;
                    drawable.flip.x = 1.0;
                    start_walk(drawable);
                }
                "w" | "ArrowUp" => drawable.velocity.y = PLAYER_SPEED,
                "s" | "ArrowDown" => drawable.velocity.y = -PLAYER_SPEED,
                _ => {}
            }
            Ok(())
        })
        .expect("level scene is active");

    world
        .keyboard_on_up(move |world, key| {
            let Some(drawable) = world.drawable_mut(player) else {
                return Ok(());
            };
            match key {
                "a" | "ArrowLeft" | "d" | "ArrowRight" => {
                    drawable.velocity.x = 0.0;
                    stop_walk(drawable);
                }
                "w" | "ArrowUp" | "s" | "ArrowDown" => drawable.velocity.y = 0.0,
                _ => {}
            }
            Ok(())
        })
        .expect("level scene is active");
}

fn start_walk(drawable: &mut sceneloop::Drawable) {
    if let Some(sprite) = drawable.sprite_mut() {
        sprite.active_animations.insert(WALK_ANIMATION.to_string());
    }
}

fn stop_walk(drawable: &mut sceneloop::Drawable) {
    if let Some(sprite) = drawable.sprite_mut() {
        sprite.active_animations.remove(WALK_ANIMATION);
        sprite.image = PLAYER_IDLE_IMAGE.to_string();
    }
}

#[cfg(test)]
mod tests {
    use sceneloop::{EntityId, InputEvent};

    use super::*;

    fn game_world() -> SceneWorld {
        let mut world = default_world();
        register_scenes(&mut world);
        world.load_scene("menu").expect("menu loads");
        world
    }

    fn key_down(key: &str) -> InputEvent {
        InputEvent::KeyDown {
            key: key.to_string(),
        }
    }

    fn key_up(key: &str) -> InputEvent {
        InputEvent::KeyUp {
            key: key.to_string(),
        }
    }

    fn player_id(world: &SceneWorld) -> EntityId {
        world.active_scene().expect("active scene").sprite_ids()[0]
    }

    fn score_text(world: &SceneWorld) -> String {
        let id = world.active_scene().expect("active scene").text_ids()[0];
        let drawable = world.drawable(id).expect("score text");
        match &drawable.kind {
            DrawableKind::Text(text) => text.text.clone(),
            other => panic!("expected text, got {}", other.name()),
        }
    }

    #[test]
    fn space_starts_the_level() {
        let mut world = game_world();
        world.dispatch_input(&key_down("Space"));
        assert_eq!(world.active_scene().map(|s| s.name()), Some("level"));
    }

    #[test]
    fn clicking_the_start_button_starts_the_level() {
        let mut world = game_world();
        // button spans world (1.75, 1.75) to (3.25, 2.5); at 100 px per
        // unit on a 500px surface it draws at pixel rows 250..325
        world.dispatch_input(&InputEvent::Click {
            x_px: 250.0,
            y_px: 287.5,
        });
        assert_eq!(world.active_scene().map(|s| s.name()), Some("level"));
    }

    #[test]
    fn clicking_outside_the_button_stays_on_the_menu() {
        let mut world = game_world();
        world.dispatch_input(&InputEvent::Click {
            x_px: 20.0,
            y_px: 20.0,
        });
        assert_eq!(world.active_scene().map(|s| s.name()), Some("menu"));
    }

    #[test]
    fn escape_returns_to_the_menu() {
        let mut world = game_world();
        world.dispatch_input(&key_down("Space"));
        world.dispatch_input(&key_down("Escape"));
        assert_eq!(world.active_scene().map(|s| s.name()), Some("menu"));
    }

    #[test]
    fn movement_keys_drive_velocity_and_walk_animation() {
        let mut world = game_world();
        world.dispatch_input(&key_down("Space"));
        let player = player_id(&world);

        world.dispatch_input(&key_down("d"));
        {
            let drawable = world.drawable(player).expect("player");
            assert_eq!(drawable.velocity.x, PLAYER_SPEED);
            assert!(drawable
                .sprite()
                .expect("player is a sprite")
                .active_animations
                .contains(WALK_ANIMATION));
        }

        world.dispatch_input(&key_up("d"));
        let drawable = world.drawable(player).expect("player");
        assert_eq!(drawable.velocity.x, 0.0);
        let sprite = drawable.sprite().expect("player is a sprite");
        assert!(sprite.active_animations.is_empty());
        assert_eq!(sprite.image, PLAYER_IDLE_IMAGE);
    }

    #[test]
    fn player_advances_one_unit_per_second_per_unit_velocity() {
        let mut world = game_world();
        world.dispatch_input(&key_down("Space"));
        let player = player_id(&world);
        let start_x = world.drawable(player).expect("player").position.x;

        world.dispatch_input(&key_down("d"));
        for _ in 0..60 {
            world.step();
        }

        let end_x = world.drawable(player).expect("player").position.x;
        assert!((end_x - start_x - PLAYER_SPEED).abs() < 0.001);
    }

    #[test]
    fn touching_a_coin_collects_it_and_updates_the_score() {
        let mut world = game_world();
        world.dispatch_input(&key_down("Space"));
        let player = player_id(&world);
        let coins_before = world.active_scene().expect("scene").sprite_ids().len();

        // drop the player onto the first coin
        if let Some(drawable) = world.drawable_mut(player) {
            drawable.position = Vec3::new(0.8, 2.0, 0.0);
        }
        world.step();
        // the HUD task sees the new score on the following tick
        world.step();

        let coins_after = world.active_scene().expect("scene").sprite_ids().len();
        assert_eq!(coins_after, coins_before - 1);
        assert_eq!(score_text(&world), "SCORE 1");
    }

    #[test]
    fn reloading_the_level_resets_the_score() {
        let mut world = game_world();
        world.dispatch_input(&key_down("Space"));
        let player = player_id(&world);
        if let Some(drawable) = world.drawable_mut(player) {
            drawable.position = Vec3::new(0.8, 2.0, 0.0);
        }
        world.step();
        world.step();
        assert_eq!(score_text(&world), "SCORE 1");

        world.dispatch_input(&key_down("Escape"));
        world.dispatch_input(&key_down("Space"));
        world.step();
        assert_eq!(score_text(&world), "SCORE 0");
        assert_eq!(world.active_scene().expect("scene").sprite_ids().len(), 4);
    }
}
