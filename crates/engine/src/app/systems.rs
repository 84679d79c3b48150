use tracing::warn;

use crate::app::entity::{Drawable, DrawableKind, EntityId};
use crate::app::math::{Axis, Vec3};
use crate::app::scene::{DeferredAction, SceneError, SceneWorld};

impl SceneWorld {
    /// Advances the simulation by one fixed tick. Pass order is part of
    /// the contract: user tasks see last tick's state, integration runs
    /// before collision detection, and the clock advances last so
    /// deferred deadlines are compared against the tick they were
    /// scheduled on.
    pub fn step(&mut self) {
        self.run_update_tasks();
        self.integrate_rigidbodies();
        self.run_deferred_actions();
        self.detect_collisions();
        self.advance_animations();
        self.mix_audio();
        self.advance_clock();
    }

    fn run_update_tasks(&mut self) {
        let Some(index) = self.active else {
            return;
        };
        let epoch = self.scenes[index].task_epoch;
        let mut tasks = std::mem::take(&mut self.scenes[index].update_tasks);
        if tasks.is_empty() {
            return;
        }
        for task in &mut tasks {
            if self.active != Some(index) || self.scenes[index].task_epoch != epoch {
                // the scene these tasks belong to was unloaded or
                // cleared mid-pass; the rest are stale
                return;
            }
            if let Err(error) = task(self) {
                warn!(%error, "update_task_failed");
            }
        }
        if self.active == Some(index) && self.scenes[index].task_epoch == epoch {
            let appended = std::mem::take(&mut self.scenes[index].update_tasks);
            tasks.extend(appended);
            self.scenes[index].update_tasks = tasks;
        }
    }

    /// Semi-implicit Euler at the tick rate, applied to every rigidbody
    /// regardless of visibility. Detection never corrects integration;
    /// collision response is the host's business.
    fn integrate_rigidbodies(&mut self) {
        let tick_rate = self.tick_rate;
        let Some(scene) = self.active_scene_mut() else {
            return;
        };
        for drawable in &mut scene.drawables {
            if !drawable.rigidbody {
                continue;
            }
            for axis in Axis::ALL {
                *drawable.position.axis_mut(axis) +=
                    drawable.velocity.axis(axis) / tick_rate;
                *drawable.velocity.axis_mut(axis) +=
                    drawable.acceleration.axis(axis) / tick_rate;
            }
        }
    }

    fn run_deferred_actions(&mut self) {
        let Some(index) = self.active else {
            return;
        };
        if self.scenes[index].deferred.is_empty() {
            return;
        }
        let now = self.clock.seconds;
        let scheduled = std::mem::take(&mut self.scenes[index].deferred);
        let mut due = Vec::new();
        for action in scheduled {
            if action.fire_at() <= now {
                due.push(action);
            } else {
                self.scenes[index].deferred.push(action);
            }
        }
        // due actions fire in schedule order; with overlapping pushes
        // the last reset to fire wins
        for action in due {
            let scene = &mut self.scenes[index];
            match action {
                DeferredAction::ResetVelocityAxis { entity, axis, .. } => {
                    if let Some(drawable) = scene.drawable_mut(entity) {
                        *drawable.velocity.axis_mut(axis) = 0.0;
                    }
                }
                DeferredAction::SnapIfAtRest {
                    entity,
                    destination,
                    ..
                } => {
                    if let Some(drawable) = scene.drawable_mut(entity) {
                        if drawable.velocity == Vec3::ZERO {
                            drawable.position = destination;
                        }
                    }
                }
            }
        }
    }

    /// Scans every drawable against the sprite listing. Hits are
    /// collected first so callbacks are free to mutate the world,
    /// including destroying either party or switching scenes. A failing
    /// callback is logged and the remaining hits still dispatch.
    fn detect_collisions(&mut self) {
        let Some(index) = self.active else {
            return;
        };

        let mut hits: Vec<(EntityId, EntityId, String)> = Vec::new();
        {
            let scene = &self.scenes[index];
            for current in &scene.drawables {
                if current.collide_with_tag.is_empty() {
                    continue;
                }
                for &sprite_id in &scene.sprites {
                    let Some(candidate) = scene.drawable(sprite_id) else {
                        continue;
                    };
                    if !current.collide_with_tag.contains_key(&candidate.tag) {
                        continue;
                    }
                    if boxes_overlap(current, candidate) {
                        hits.push((current.id, candidate.id, candidate.tag.clone()));
                    }
                }
            }
        }

        for (current, other, tag) in hits {
            if self.active != Some(index) {
                break;
            }
            let callback = self.scenes[index]
                .drawable_mut(current)
                .and_then(|d| d.collide_with_tag.remove(&tag));
            let Some(mut callback) = callback else {
                continue;
            };
            if let Err(error) = callback(self, current, other) {
                warn!(
                    entity = current.0,
                    other = other.0,
                    tag = %tag,
                    %error,
                    "collision_callback_failed"
                );
            }
            if self.active == Some(index) {
                if let Some(drawable) = self.scenes[index].drawable_mut(current) {
                    drawable.collide_with_tag.entry(tag).or_insert(callback);
                }
            }
        }
    }

    /// Advances sprite animations at each sprite's own rate. All active
    /// tracks of a sprite share one frame counter.
    fn advance_animations(&mut self) {
        let tick_rate = self.tick_rate;
        let Some(scene) = self.active_scene_mut() else {
            return;
        };
        for drawable in &mut scene.drawables {
            let DrawableKind::Sprite(sprite) = &mut drawable.kind else {
                continue;
            };
            if sprite.active_animations.is_empty() {
                continue;
            }
            sprite.animation_accumulator += sprite.animation_speed / tick_rate;
            while sprite.animation_accumulator >= 1.0 {
                sprite.animation_accumulator -= 1.0;
                let mut next_image = None;
                for name in &sprite.active_animations {
                    let Some(frames) = sprite.animation_on.get(name) else {
                        continue;
                    };
                    if frames.is_empty() {
                        continue;
                    }
                    sprite.animation_frame = sprite.animation_frame.wrapping_add(1);
                    let frame = sprite.animation_frame as usize % frames.len();
                    next_image = Some(frames[frame].clone());
                }
                if let Some(image) = next_image {
                    sprite.image = image;
                }
            }
        }
    }

    fn mix_audio(&mut self) {
        let SceneWorld {
            scenes,
            active,
            audio_mixer,
            ..
        } = self;
        let Some(index) = *active else {
            return;
        };
        for handle in &mut scenes[index].audio {
            audio_mixer.apply(handle.as_mut());
        }
    }

    fn advance_clock(&mut self) {
        self.clock.seconds += 1.0 / f64::from(self.tick_rate);
        self.clock.tick += 1;
    }

    /// Gives the entity the velocity that covers `displacement` in
    /// `duration_seconds`, and schedules a per-axis velocity reset for
    /// when the duration elapses. Re-pushing before a reset fires leaves
    /// both resets pending; whichever fires last wins.
    pub fn push(
        &mut self,
        id: EntityId,
        displacement: Vec3,
        duration_seconds: f32,
    ) -> Result<(), SceneError> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(SceneError::InvalidPushDuration(duration_seconds));
        }
        let fire_at = self.clock.seconds + f64::from(duration_seconds);
        let Some(index) = self.active else {
            return Err(SceneError::NoActiveScene);
        };
        {
            let drawable = self.scenes[index]
                .drawable_mut(id)
                .ok_or(SceneError::UnknownEntity(id))?;
            for axis in Axis::ALL {
                *drawable.velocity.axis_mut(axis) =
                    displacement.axis(axis) / duration_seconds;
            }
        }
        for axis in Axis::ALL {
            self.scenes[index]
                .deferred
                .push(DeferredAction::ResetVelocityAxis {
                    entity: id,
                    axis,
                    fire_at,
                });
        }
        Ok(())
    }

    /// Like [`SceneWorld::push`], but only acts on an entity at rest and
    /// snaps the final position to exactly `position + displacement`
    /// once the velocity reset has landed, so float drift cannot leave
    /// the entity short of or past the intended endpoint.
    pub fn push_no_interrupt(
        &mut self,
        id: EntityId,
        displacement: Vec3,
        duration_seconds: f32,
    ) -> Result<(), SceneError> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(SceneError::InvalidPushDuration(duration_seconds));
        }
        let Some(index) = self.active else {
            return Err(SceneError::NoActiveScene);
        };
        let destination = {
            let drawable = self.scenes[index]
                .drawable(id)
                .ok_or(SceneError::UnknownEntity(id))?;
            if drawable.velocity != Vec3::ZERO {
                return Ok(());
            }
            drawable.position + displacement
        };
        self.push(id, displacement, duration_seconds)?;
        let fire_at = self.clock.seconds + f64::from(duration_seconds);
        // appended after the resets so the snap observes zeroed velocity
        self.scenes[index].deferred.push(DeferredAction::SnapIfAtRest {
            entity: id,
            destination,
            fire_at,
        });
        Ok(())
    }
}

/// Inclusive AABB overlap on all three axes: touching counts.
fn boxes_overlap(a: &Drawable, b: &Drawable) -> bool {
    Axis::ALL.iter().all(|&axis| {
        let a_min = a.position.axis(axis);
        let a_max = a_min + a.collision_end.axis(axis);
        let b_min = b.position.axis(axis);
        let b_max = b_min + b.collision_end.axis(axis);
        a_min <= b_max && b_min <= a_max
    })
}
