use std::collections::HashMap;

/// Opaque playback handle owned by a scene. The engine only adjusts
/// volume and pauses on unload; decoding and output live behind the
/// implementation.
pub trait AudioHandle {
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    /// Category tag ("music", "sfx", ...) matched against mixer
    /// overrides.
    fn kind(&self) -> &str;
    fn pause(&mut self);
}

/// Master/per-kind volume policy applied to every handle in the active
/// scene once per tick.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    master_volume: f32,
    kind_overrides: HashMap<String, f32>,
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            kind_overrides: HashMap::new(),
        }
    }
}

impl AudioMixer {
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    /// Pins every handle of `kind` to an absolute volume, overriding the
    /// master adjustment.
    pub fn set_kind_volume(&mut self, kind: impl Into<String>, volume: f32) {
        self.kind_overrides
            .insert(kind.into(), volume.clamp(0.0, 1.0));
    }

    pub fn clear_kind_volume(&mut self, kind: &str) {
        self.kind_overrides.remove(kind);
    }

    pub(crate) fn apply(&self, handle: &mut dyn AudioHandle) {
        if let Some(&pinned) = self.kind_overrides.get(handle.kind()) {
            handle.set_volume(pinned);
            return;
        }
        // runs once per tick; at full master the handle keeps its exact
        // volume instead of accumulating float round-off
        if self.master_volume >= 1.0 {
            return;
        }
        let adjusted = (handle.volume() + self.master_volume - 1.0).clamp(0.0, 1.0);
        handle.set_volume(adjusted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAudio {
        volume: f32,
        kind: &'static str,
        paused: bool,
    }

    impl AudioHandle for FakeAudio {
        fn volume(&self) -> f32 {
            self.volume
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }

        fn kind(&self) -> &str {
            self.kind
        }

        fn pause(&mut self) {
            self.paused = true;
        }
    }

    #[test]
    fn full_master_volume_leaves_handles_untouched() {
        let mixer = AudioMixer::default();
        let mut audio = FakeAudio {
            volume: 0.7,
            kind: "music",
            paused: false,
        };
        mixer.apply(&mut audio);
        mixer.apply(&mut audio);
        mixer.apply(&mut audio);
        assert_eq!(audio.volume, 0.7);
    }

    #[test]
    fn reduced_master_volume_attenuates_toward_zero() {
        let mut mixer = AudioMixer::default();
        mixer.set_master_volume(0.5);
        let mut audio = FakeAudio {
            volume: 0.7,
            kind: "music",
            paused: false,
        };
        mixer.apply(&mut audio);
        assert!((audio.volume - 0.2).abs() < 1e-6);
        mixer.apply(&mut audio);
        mixer.apply(&mut audio);
        assert_eq!(audio.volume, 0.0);
    }

    #[test]
    fn kind_override_pins_volume_regardless_of_master() {
        let mut mixer = AudioMixer::default();
        mixer.set_master_volume(0.1);
        mixer.set_kind_volume("sfx", 0.9);
        let mut audio = FakeAudio {
            volume: 0.3,
            kind: "sfx",
            paused: false,
        };
        mixer.apply(&mut audio);
        assert_eq!(audio.volume, 0.9);

        mixer.clear_kind_volume("sfx");
        mixer.apply(&mut audio);
        assert!(audio.volume < 0.9);
    }

    #[test]
    fn volumes_are_clamped_to_unit_range() {
        let mut mixer = AudioMixer::default();
        mixer.set_master_volume(7.0);
        assert_eq!(mixer.master_volume(), 1.0);
        mixer.set_kind_volume("music", -3.0);
        let mut audio = FakeAudio {
            volume: 0.5,
            kind: "music",
            paused: false,
        };
        mixer.apply(&mut audio);
        assert_eq!(audio.volume, 0.0);
    }
}
