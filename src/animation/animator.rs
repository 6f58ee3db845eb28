use super::clip::{parse_clip_value, AnimationClip};
use super::timeline::{Property, Target};
use crate::ecs::{Behaviour, BehaviourCtx, EntityId, SceneWorld, StageError};
use crate::events::StageEvent;
use crate::skeleton::Skeleton;
use crate::sprite::Sprite;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_MIX_DURATION: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimatorState {
    Idle,
    Playing,
    Transitioning,
    /// A clip is loaded but `stop` froze it.
    Paused,
}

/// Timeline index -> bone index, valid for one skeleton revision.
#[derive(Clone, Debug)]
struct BoneBindings {
    revision: u64,
    bones: Vec<Option<usize>>,
}

#[derive(Clone, Debug)]
struct PlayState {
    clip: Arc<AnimationClip>,
    time: f32,
    finished: bool,
    bindings: Option<BoneBindings>,
}

impl PlayState {
    fn new(clip: Arc<AnimationClip>) -> Self {
        Self { clip, time: 0.0, finished: false, bindings: None }
    }

    /// Returns true on the step a non-looping clip reaches its end.
    fn advance(&mut self, step: f32) -> bool {
        let raw = self.time + step;
        self.time = self.clip.wrap_time(raw);
        if self.clip.looping || self.finished || raw < self.clip.duration {
            return false;
        }
        self.finished = true;
        true
    }
}

/// Plays clips from a small library onto the owning entity's skeleton (or its
/// transform and sprite for `"self"` timelines), cross-fading between clips.
#[derive(Clone, Debug)]
pub struct Animator {
    clips: BTreeMap<String, Arc<AnimationClip>>,
    current: Option<PlayState>,
    previous: Option<PlayState>,
    /// Current timeline index -> matching previous timeline index.
    pairing: Vec<Option<usize>>,
    mix_timer: f32,
    mix_duration: f32,
    default_mix: f32,
    speed: f32,
    playing: bool,
    autoplay: Option<String>,
}

impl Default for Animator {
    fn default() -> Self {
        Self {
            clips: BTreeMap::new(),
            current: None,
            previous: None,
            pairing: Vec::new(),
            mix_timer: 0.0,
            mix_duration: 0.0,
            default_mix: DEFAULT_MIX_DURATION,
            speed: 1.0,
            playing: false,
            autoplay: None,
        }
    }
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, clip: AnimationClip) -> Self {
        self.add_clip(Arc::new(clip));
        self
    }

    pub fn with_autoplay(mut self, name: &str) -> Self {
        self.autoplay = Some(name.to_string());
        self
    }

    pub fn add_clip(&mut self, clip: Arc<AnimationClip>) {
        self.clips.insert(clip.name.to_string(), clip);
    }

    pub fn remove_clip(&mut self, name: &str) -> bool {
        self.clips.remove(name).is_some()
    }

    pub fn clip(&self, name: &str) -> Option<&Arc<AnimationClip>> {
        self.clips.get(name)
    }

    pub fn clip_names(&self) -> impl Iterator<Item = &str> {
        self.clips.keys().map(|name| name.as_str())
    }

    pub fn autoplay(&self) -> Option<&str> {
        self.autoplay.as_deref()
    }

    pub fn set_autoplay(&mut self, name: Option<&str>) {
        self.autoplay = name.map(str::to_string);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        if speed.is_finite() {
            self.speed = speed;
        } else {
            log::warn!("animator: ignoring non-finite speed {speed}");
        }
    }

    pub fn default_mix(&self) -> f32 {
        self.default_mix
    }

    pub fn set_default_mix(&mut self, duration: f32) {
        self.default_mix = duration.max(0.0);
    }

    /// Instant cut to `name`.
    pub fn play(&mut self, name: &str) -> bool {
        self.cross_fade(name, 0.0)
    }

    pub fn cross_fade_default(&mut self, name: &str) -> bool {
        self.cross_fade(name, self.default_mix)
    }

    /// Blends from the current clip into `name` over `duration` seconds. Requesting the
    /// clip that is already looping, outside a transition, changes nothing.
    pub fn cross_fade(&mut self, name: &str, duration: f32) -> bool {
        let Some(clip) = self.clips.get(name).cloned() else {
            log::warn!("animator has no clip named '{name}'");
            return false;
        };
        if let Some(current) = &self.current {
            if self.playing && self.previous.is_none() && current.clip.looping && current.clip.name.as_ref() == name {
                return true;
            }
        }
        let next = PlayState::new(clip);
        if duration > 0.0 && self.current.is_some() {
            self.previous = self.current.take();
            self.mix_timer = 0.0;
            self.mix_duration = duration;
        } else {
            self.previous = None;
            self.mix_timer = 0.0;
            self.mix_duration = 0.0;
        }
        self.pairing = match &self.previous {
            Some(previous) => next
                .clip
                .timelines
                .iter()
                .map(|timeline| {
                    previous.clip.find_timeline(&timeline.target, timeline.property).map(|(index, _)| index)
                })
                .collect(),
            None => Vec::new(),
        };
        self.current = Some(next);
        self.playing = true;
        true
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn resume(&mut self) {
        if self.current.is_some() {
            self.playing = true;
        }
    }

    pub fn state(&self) -> AnimatorState {
        match (&self.current, &self.previous) {
            (None, _) => AnimatorState::Idle,
            _ if !self.playing => AnimatorState::Paused,
            (Some(_), Some(_)) => AnimatorState::Transitioning,
            (Some(_), None) => AnimatorState::Playing,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.previous.is_some()
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.current.as_ref().map(|state| state.clip.name.as_ref())
    }

    pub fn previous_clip(&self) -> Option<&str> {
        self.previous.as_ref().map(|state| state.clip.name.as_ref())
    }

    pub fn current_time(&self) -> f32 {
        self.current.as_ref().map(|state| state.time).unwrap_or(0.0)
    }

    pub fn previous_time(&self) -> Option<f32> {
        self.previous.as_ref().map(|state| state.time)
    }

    pub fn mix_timer(&self) -> f32 {
        self.mix_timer
    }

    pub fn mix_duration(&self) -> f32 {
        self.mix_duration
    }

    /// Weight of the current clip; 1 outside a transition.
    pub fn blend_alpha(&self) -> f32 {
        if self.previous.is_none() || self.mix_duration <= 0.0 {
            return 1.0;
        }
        (self.mix_timer / self.mix_duration).clamp(0.0, 1.0)
    }

    /// Moves both clips forward by `dt * speed` and ends the transition once the mix
    /// timer covers the mix duration. Returns true when the current clip just finished.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.playing {
            return false;
        }
        let step = dt * self.speed;
        if !step.is_finite() {
            return false;
        }
        let finished = self.current.as_mut().map(|state| state.advance(step)).unwrap_or(false);
        if let Some(previous) = self.previous.as_mut() {
            previous.advance(step);
            self.mix_timer += step.abs();
            if self.mix_timer >= self.mix_duration {
                self.previous = None;
                self.pairing.clear();
            }
        }
        finished
    }

    fn blend_with_previous(&self, index: usize, value: f32, alpha: f32) -> f32 {
        let (Some(previous), Some(Some(prev_index))) = (&self.previous, self.pairing.get(index)) else {
            return value;
        };
        match previous.clip.timelines.get(*prev_index).and_then(|timeline| timeline.sample(previous.time)) {
            Some(from) => from + (value - from) * alpha,
            None => value,
        }
    }

    /// Blended value of one continuous channel at the current times.
    pub fn sample(&self, target: &Target, property: Property) -> Option<f32> {
        let current = self.current.as_ref()?;
        let (index, timeline) = current.clip.find_timeline(target, property)?;
        let value = timeline.sample(current.time)?;
        Some(self.blend_with_previous(index, value, self.blend_alpha()))
    }

    /// The discrete frame comes from the current clip only.
    pub fn sample_frame(&self, target: &Target) -> Option<&str> {
        let current = self.current.as_ref()?;
        current.clip.find_timeline(target, Property::Frame)?.1.sample_frame(current.time)
    }

    fn refresh_bindings(&mut self, world: &SceneWorld, entity: EntityId) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let Some(skeleton) = world.get_component::<Skeleton>(entity) else {
            current.bindings = None;
            return;
        };
        if current.bindings.as_ref().map(|b| b.revision) == Some(skeleton.revision()) {
            return;
        }
        let bones = current
            .clip
            .timelines
            .iter()
            .map(|timeline| match &timeline.target {
                Target::SelfEntity => None,
                Target::Bone(name) => {
                    let found = skeleton.find_bone(name);
                    if found.is_none() {
                        log::warn!(
                            "clip '{}' animates missing bone '{name}'; timeline skipped",
                            current.clip.name
                        );
                    }
                    found
                }
            })
            .collect();
        current.bindings = Some(BoneBindings { revision: skeleton.revision(), bones });
    }

    /// Writes the sampled pose into the entity's skeleton, transform and sprite.
    pub fn apply(&mut self, world: &mut SceneWorld, entity: EntityId) {
        self.refresh_bindings(world, entity);
        let Some(current) = self.current.as_ref() else {
            return;
        };
        let alpha = self.blend_alpha();
        for (index, timeline) in current.clip.timelines.iter().enumerate() {
            let bone = match &timeline.target {
                Target::SelfEntity => None,
                Target::Bone(_) => {
                    match current.bindings.as_ref().and_then(|b| b.bones.get(index).copied().flatten()) {
                        Some(bone) => Some(bone),
                        None => continue,
                    }
                }
            };
            if timeline.property.is_discrete() {
                if let Some(frame) = timeline.sample_frame(current.time) {
                    write_frame(world, entity, bone, frame);
                }
                continue;
            }
            if let Some(value) = timeline.sample(current.time) {
                let value = self.blend_with_previous(index, value, alpha);
                write_scalar(world, entity, bone, timeline.property, value);
            }
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "speed": self.speed,
            "defaultMix": self.default_mix,
            "autoplay": self.autoplay,
            "clips": self.clips.values().map(|clip| clip.to_value()).collect::<Vec<_>>(),
        })
    }
}

fn write_scalar(world: &mut SceneWorld, entity: EntityId, bone: Option<usize>, property: Property, value: f32) {
    match bone {
        None => {
            let Some(transform) = world.transform_mut(entity) else {
                return;
            };
            match property {
                Property::X => transform.translation.x = value,
                Property::Y => transform.translation.y = value,
                Property::Rotation => transform.rotation = value,
                Property::ScaleX => transform.scale.x = value,
                Property::ScaleY => transform.scale.y = value,
                Property::Frame => {}
            }
        }
        Some(index) => {
            if let Some(bone) = world.get_component_mut::<Skeleton>(entity).and_then(|s| s.bone_mut(index)) {
                bone.set_property(property, value);
            }
        }
    }
}

fn write_frame(world: &mut SceneWorld, entity: EntityId, bone: Option<usize>, frame: &str) {
    let shown = match bone {
        None => world.get_component::<Sprite>(entity).map(|sprite| sprite.path() == frame),
        Some(index) => world
            .get_component::<Skeleton>(entity)
            .and_then(|s| s.bone(index))
            .map(|b| b.skin.sprite_path() == Some(frame)),
    };
    // Missing display surface, or the frame is already up.
    if shown != Some(false) {
        return;
    }
    let handle = world.resolve_drawable(frame);
    let replaced = match bone {
        None => world.get_component_mut::<Sprite>(entity).and_then(|sprite| sprite.set_frame(frame, handle)),
        Some(index) => world
            .get_component_mut::<Skeleton>(entity)
            .and_then(|s| s.bone_mut(index))
            .and_then(|b| b.skin.set_frame(frame, handle)),
    };
    if let Some(old) = replaced {
        world.release_drawable(old);
    }
}

impl Behaviour for Animator {
    fn type_name(&self) -> &'static str {
        "Animator"
    }

    fn on_start(&mut self, ctx: &mut BehaviourCtx<'_>) {
        let Some(name) = self.autoplay.clone() else {
            return;
        };
        if self.current.is_none() && !self.play(&name) {
            ctx.world.emit(StageEvent::ClipMissing { entity: ctx.entity, clip: name });
        }
    }

    fn on_update(&mut self, ctx: &mut BehaviourCtx<'_>, dt: f32) {
        let finished = self.advance(dt);
        self.apply(ctx.world, ctx.entity);
        if finished {
            if let Some(clip) = self.current_clip() {
                let clip = clip.to_string();
                ctx.world.emit(StageEvent::ClipFinished { entity: ctx.entity, clip });
            }
        }
    }

    fn save(&self) -> Option<Value> {
        Some(self.to_value())
    }

    fn load(&mut self, data: &Value) -> Result<(), StageError> {
        let object = data.as_object().ok_or_else(|| StageError::invalid_data("Animator", "expected an object"))?;
        if let Some(speed) = object.get("speed").and_then(Value::as_f64) {
            self.speed = speed as f32;
        }
        if let Some(mix) = object.get("defaultMix").and_then(Value::as_f64) {
            self.set_default_mix(mix as f32);
        }
        self.autoplay = object.get("autoplay").and_then(Value::as_str).map(str::to_string);
        if let Some(clips) = object.get("clips").and_then(Value::as_array) {
            for (index, raw) in clips.iter().enumerate() {
                match parse_clip_value(raw, &format!("clip_{index}")) {
                    Ok(clip) => self.add_clip(Arc::new(clip)),
                    Err(err) => log::warn!("animator: skipped clip {index}: {err:#}"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Curve, Keyframe, Timeline};
    use approx::assert_abs_diff_eq;

    fn ramp(name: &str, from: f32, to: f32, looping: bool) -> AnimationClip {
        let timeline = Timeline::new(
            Target::bone("arm"),
            Property::Rotation,
            vec![Keyframe::scalar(0.0, from, Curve::Linear), Keyframe::scalar(1.0, to, Curve::Linear)],
        )
        .expect("timeline");
        AnimationClip::new(name, 1.0, looping, vec![timeline])
    }

    #[test]
    fn play_is_instant_and_redundant_play_is_noop() {
        let mut animator = Animator::new().with_clip(ramp("idle", 0.0, 10.0, true));
        assert_eq!(animator.state(), AnimatorState::Idle);
        assert!(animator.play("idle"));
        animator.advance(0.4);
        assert!(animator.play("idle"));
        assert_abs_diff_eq!(animator.current_time(), 0.4, epsilon = 1e-6);
        assert_eq!(animator.state(), AnimatorState::Playing);
        assert!(!animator.play("missing"));
    }

    #[test]
    fn non_looping_replay_restarts() {
        let mut animator = Animator::new().with_clip(ramp("attack", 0.0, 1.0, false));
        animator.play("attack");
        assert!(animator.advance(1.5));
        assert_eq!(animator.current_time(), 1.0);
        assert!(!animator.advance(0.1));
        animator.play("attack");
        assert_eq!(animator.current_time(), 0.0);
    }

    #[test]
    fn transition_ends_when_mix_elapses() {
        let mut animator =
            Animator::new().with_clip(ramp("a", 0.0, 10.0, true)).with_clip(ramp("b", 100.0, 110.0, true));
        animator.play("a");
        animator.advance(0.5);
        animator.cross_fade("b", 0.2);
        assert_eq!(animator.state(), AnimatorState::Transitioning);
        assert_eq!(animator.previous_clip(), Some("a"));
        animator.advance(0.1);
        assert_abs_diff_eq!(animator.blend_alpha(), 0.5, epsilon = 1e-5);
        animator.advance(0.1);
        assert_eq!(animator.state(), AnimatorState::Playing);
        assert_eq!(animator.blend_alpha(), 1.0);
    }

    #[test]
    fn stopped_animator_is_paused_and_frozen() {
        let mut animator = Animator::new().with_clip(ramp("a", 0.0, 10.0, true));
        assert_eq!(animator.state(), AnimatorState::Idle);
        animator.play("a");
        animator.advance(0.25);
        animator.stop();
        assert_eq!(animator.state(), AnimatorState::Paused);
        assert!(!animator.advance(1.0));
        assert_abs_diff_eq!(animator.current_time(), 0.25, epsilon = 1e-6);
        animator.resume();
        assert_eq!(animator.state(), AnimatorState::Playing);
    }

    #[test]
    fn saved_animator_keeps_clips_and_settings() {
        let mut animator = Animator::new().with_clip(ramp("wave", 0.0, 45.0, true)).with_autoplay("wave");
        animator.set_speed(1.5);
        let value = animator.save().expect("animator serializes");
        let mut loaded = Animator::new();
        loaded.load(&value).expect("load");
        assert_eq!(loaded.autoplay(), Some("wave"));
        assert_eq!(loaded.speed(), 1.5);
        assert_eq!(loaded.clip_names().collect::<Vec<_>>(), vec!["wave"]);
    }

    #[test]
    fn non_finite_speed_or_step_leaves_time_alone() {
        let mut animator = Animator::new().with_clip(ramp("a", 0.0, 10.0, true));
        animator.play("a");
        animator.set_speed(f32::NAN);
        assert_eq!(animator.speed(), 1.0);
        assert!(!animator.advance(f32::NAN));
        assert_eq!(animator.current_time(), 0.0);
        animator.advance(0.5);
        let sample = animator.sample(&Target::bone("arm"), Property::Rotation).expect("sample");
        assert_abs_diff_eq!(sample, 5.0, epsilon = 1e-5);
    }
}
