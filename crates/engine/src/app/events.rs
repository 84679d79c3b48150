use tracing::warn;

use crate::app::entity::{CallbackError, EntityId};
use crate::app::rendering::DrawMode;
use crate::app::scene::{SceneError, SceneWorld};

/// Logical input delivered to the active scene once per occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { key: String },
    KeyUp { key: String },
    Click { x_px: f32, y_px: f32 },
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InputEvent::KeyDown { .. } => EventKind::KeyDown,
            InputEvent::KeyUp { .. } => EventKind::KeyUp,
            InputEvent::Click { .. } => EventKind::Click,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    Click,
}

/// Handle for removing a binding later. Ids are world-unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub(crate) u64);

pub type EventCallback = Box<dyn FnMut(&mut SceneWorld, &InputEvent) -> Result<(), CallbackError>>;

pub(crate) struct EventBinding {
    pub(crate) id: BindingId,
    pub(crate) callback: EventCallback,
}

impl SceneWorld {
    /// Binds a callback on the active scene for one event kind.
    /// Bindings die with the scene; unload removes them all.
    pub fn bind(
        &mut self,
        kind: EventKind,
        callback: impl FnMut(&mut SceneWorld, &InputEvent) -> Result<(), CallbackError> + 'static,
    ) -> Result<BindingId, SceneError> {
        if self.active_scene().is_none() {
            return Err(SceneError::NoActiveScene);
        }
        let id = self.allocate_binding_id();
        let scene = self.active_scene_mut().ok_or(SceneError::NoActiveScene)?;
        scene.bindings.entry(kind).or_default().push(EventBinding {
            id,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Removes one binding. Unbinding an id that was never added, or
    /// was already removed, is a no-op.
    pub fn unbind(&mut self, kind: EventKind, id: BindingId) -> bool {
        let Some(scene) = self.active_scene_mut() else {
            return false;
        };
        let Some(bindings) = scene.bindings.get_mut(&kind) else {
            return false;
        };
        let before = bindings.len();
        bindings.retain(|binding| binding.id != id);
        bindings.len() != before
    }

    pub fn keyboard_on_down(
        &mut self,
        mut callback: impl FnMut(&mut SceneWorld, &str) -> Result<(), CallbackError> + 'static,
    ) -> Result<BindingId, SceneError> {
        self.bind(EventKind::KeyDown, move |world, event| {
            if let InputEvent::KeyDown { key } = event {
                let key = key.clone();
                callback(world, &key)
            } else {
                Ok(())
            }
        })
    }

    pub fn keyboard_on_up(
        &mut self,
        mut callback: impl FnMut(&mut SceneWorld, &str) -> Result<(), CallbackError> + 'static,
    ) -> Result<BindingId, SceneError> {
        self.bind(EventKind::KeyUp, move |world, event| {
            if let InputEvent::KeyUp { key } = event {
                let key = key.clone();
                callback(world, &key)
            } else {
                Ok(())
            }
        })
    }

    /// Runs every binding registered for the event's kind, then the
    /// click hit-test pass. A failing binding is logged and skipped;
    /// a scene switch mid-dispatch stops the remaining bindings, which
    /// belonged to the unloaded scene.
    pub fn dispatch_input(&mut self, event: &InputEvent) {
        let Some(index) = self.active else {
            return;
        };
        let kind = event.kind();
        let epoch = self.scenes[index].task_epoch;

        if let Some(mut bindings) = self.scenes[index].bindings.remove(&kind) {
            for binding in &mut bindings {
                if self.active != Some(index) || self.scenes[index].task_epoch != epoch {
                    break;
                }
                if let Err(error) = (binding.callback)(self, event) {
                    warn!(binding = binding.id.0, %error, "event_binding_failed");
                }
            }
            if self.active == Some(index) && self.scenes[index].task_epoch == epoch {
                // bindings added during dispatch landed in the map; keep
                // the originals first
                let appended = self.scenes[index]
                    .bindings
                    .remove(&kind)
                    .unwrap_or_default();
                bindings.extend(appended);
                self.scenes[index].bindings.insert(kind, bindings);
            }
        }

        if let InputEvent::Click { x_px, y_px } = *event {
            self.dispatch_click(index, x_px, y_px);
        }
    }

    /// Invokes `on_click` for every visible, active drawable whose
    /// world-space box contains the click point.
    fn dispatch_click(&mut self, index: usize, x_px: f32, y_px: f32) {
        if self.active != Some(index) {
            return;
        }
        let scale = self.geometry.units_per_pixel();
        let world_x = x_px / scale.x;
        // Canvas mode addresses pixel rows top-down; the other modes
        // draw with a bottom-left origin, so the click row is flipped
        // before the box test to land on the drawn entity.
        let world_y = match self.draw_mode {
            DrawMode::Canvas => y_px / scale.y,
            DrawMode::Normal | DrawMode::Centered => {
                (self.geometry.height() as f32 - y_px) / scale.y
            }
        };

        let hits: Vec<EntityId> = self.scenes[index]
            .drawables
            .iter()
            .filter(|d| !d.hidden && d.active && d.has_click_handler())
            .filter(|d| {
                world_x >= d.position.x
                    && world_x <= d.position.x + d.size.x
                    && world_y >= d.position.y
                    && world_y <= d.position.y + d.size.y
            })
            .map(|d| d.id)
            .collect();

        for id in hits {
            if self.active != Some(index) {
                break;
            }
            let callback = self.scenes[index]
                .drawable_mut(id)
                .and_then(|d| d.click_slot())
                .and_then(Option::take);
            let Some(mut callback) = callback else {
                continue;
            };
            if let Err(error) = callback(self, id) {
                warn!(entity = id.0, %error, "click_callback_failed");
            }
            if self.active == Some(index) {
                if let Some(slot) = self
                    .scenes[index]
                    .drawable_mut(id)
                    .and_then(|d| d.click_slot())
                {
                    if slot.is_none() {
                        *slot = Some(callback);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::math::Vec3;
    use crate::app::rendering::SurfaceGeometry;
    use std::cell::Cell;
    use std::rc::Rc;

    fn test_world() -> SceneWorld {
        let geometry =
            SurfaceGeometry::new(500, 500, Vec3::splat(100.0)).expect("valid geometry");
        SceneWorld::new(geometry)
    }

    fn key_down(key: &str) -> InputEvent {
        InputEvent::KeyDown {
            key: key.to_string(),
        }
    }

    #[test]
    fn bindings_fire_in_registration_order() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();
        world
            .bind(EventKind::KeyDown, move |_, _| {
                first.borrow_mut().push(1);
                Ok(())
            })
            .expect("bind");
        world
            .bind(EventKind::KeyDown, move |_, _| {
                second.borrow_mut().push(2);
                Ok(())
            })
            .expect("bind");

        world.dispatch_input(&key_down("a"));
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn failing_binding_does_not_stop_the_rest() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let reached = Rc::new(Cell::new(false));
        let flag = reached.clone();
        world
            .bind(EventKind::KeyDown, |_, _| {
                Err(CallbackError::new("boom"))
            })
            .expect("bind");
        world
            .bind(EventKind::KeyDown, move |_, _| {
                flag.set(true);
                Ok(())
            })
            .expect("bind");

        world.dispatch_input(&key_down("a"));
        assert!(reached.get());
    }

    #[test]
    fn unbind_removes_one_binding_and_tolerates_stale_ids() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let hits = Rc::new(Cell::new(0u32));
        let counter = hits.clone();
        let id = world
            .bind(EventKind::KeyDown, move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            })
            .expect("bind");

        assert!(world.unbind(EventKind::KeyDown, id));
        assert!(!world.unbind(EventKind::KeyDown, id));
        assert!(!world.unbind(EventKind::Click, id));

        world.dispatch_input(&key_down("a"));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn keyboard_helper_receives_the_key_name() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let seen = Rc::new(std::cell::RefCell::new(String::new()));
        let sink = seen.clone();
        world
            .keyboard_on_down(move |_, key| {
                sink.borrow_mut().push_str(key);
                Ok(())
            })
            .expect("bind");

        world.dispatch_input(&key_down("w"));
        world.dispatch_input(&InputEvent::KeyUp {
            key: "w".to_string(),
        });
        assert_eq!(*seen.borrow(), "w");
    }

    #[test]
    fn scene_switch_during_dispatch_drops_remaining_bindings() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.add_scene("level", |_| {});
        world.load_scene("menu").expect("load");

        let reached = Rc::new(Cell::new(false));
        let flag = reached.clone();
        world
            .bind(EventKind::KeyDown, |world, _| {
                world.load_scene("level").expect("switch");
                Ok(())
            })
            .expect("bind");
        world
            .bind(EventKind::KeyDown, move |_, _| {
                flag.set(true);
                Ok(())
            })
            .expect("bind");

        world.dispatch_input(&key_down("a"));
        assert!(!reached.get());
        assert_eq!(world.active_scene().map(|s| s.name()), Some("level"));
        assert_eq!(world.scene_by_name("menu").unwrap().binding_count(), 0);
    }

    #[test]
    fn click_hit_tests_in_world_units() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let clicked = Rc::new(Cell::new(0u32));
        let id = world
            .spawn_square(Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.5, 0.5, 0.0))
            .expect("spawn");
        let counter = clicked.clone();
        if let Some(slot) = world.drawable_mut(id).and_then(|d| d.click_slot()) {
            *slot = Some(Box::new(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            }));
        }

        // inside: world (1.2, 1.2) draws at pixel row 500 - 120
        world.dispatch_input(&InputEvent::Click {
            x_px: 120.0,
            y_px: 380.0,
        });
        // outside on x
        world.dispatch_input(&InputEvent::Click {
            x_px: 170.0,
            y_px: 380.0,
        });
        assert_eq!(clicked.get(), 1);
    }

    #[test]
    fn clicks_land_on_the_drawn_box_not_its_mirror() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let clicked = Rc::new(Cell::new(0u32));
        // world (1.75, 1.75) size (1.5, 0.75) draws at pixels
        // x 175..325, y 250..325 on a 500px surface
        let id = world
            .spawn_square(Vec3::new(1.75, 1.75, 0.0), Vec3::new(1.5, 0.75, 0.0))
            .expect("spawn");
        let counter = clicked.clone();
        if let Some(slot) = world.drawable_mut(id).and_then(|d| d.click_slot()) {
            *slot = Some(Box::new(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            }));
        }

        // center of the drawn box
        world.dispatch_input(&InputEvent::Click {
            x_px: 250.0,
            y_px: 287.5,
        });
        assert_eq!(clicked.get(), 1);

        // same x at the box's vertical mirror image must miss
        world.dispatch_input(&InputEvent::Click {
            x_px: 250.0,
            y_px: 212.5,
        });
        assert_eq!(clicked.get(), 1);
    }

    #[test]
    fn canvas_mode_clicks_use_raw_pixel_rows() {
        let mut world = test_world();
        world.draw_mode = DrawMode::Canvas;
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let clicked = Rc::new(Cell::new(0u32));
        let id = world
            .spawn_square(Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.5, 0.5, 0.0))
            .expect("spawn");
        let counter = clicked.clone();
        if let Some(slot) = world.drawable_mut(id).and_then(|d| d.click_slot()) {
            *slot = Some(Box::new(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            }));
        }

        world.dispatch_input(&InputEvent::Click {
            x_px: 120.0,
            y_px: 120.0,
        });
        world.dispatch_input(&InputEvent::Click {
            x_px: 120.0,
            y_px: 380.0,
        });
        assert_eq!(clicked.get(), 1);
    }

    #[test]
    fn hidden_entities_do_not_receive_clicks() {
        let mut world = test_world();
        world.add_scene("menu", |_| {});
        world.load_scene("menu").expect("load");

        let clicked = Rc::new(Cell::new(false));
        let id = world
            .spawn_square(Vec3::ZERO, Vec3::splat(1.0))
            .expect("spawn");
        let flag = clicked.clone();
        if let Some(drawable) = world.drawable_mut(id) {
            drawable.hidden = true;
            if let Some(slot) = drawable.click_slot() {
                *slot = Some(Box::new(move |_, _| {
                    flag.set(true);
                    Ok(())
                }));
            }
        }

        world.dispatch_input(&InputEvent::Click {
            x_px: 50.0,
            y_px: 450.0,
        });
        assert!(!clicked.get());
    }
}
