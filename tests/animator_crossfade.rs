use approx::assert_abs_diff_eq;
use kestrel_stage::animation::{
    AnimationClip, Animator, AnimatorState, Curve, Keyframe, Property, Target, Timeline,
};
use kestrel_stage::assets::ClipStore;
use kestrel_stage::ecs::{EntityId, SceneWorld};
use kestrel_stage::events::StageEvent;
use kestrel_stage::skeleton::Skeleton;
use kestrel_stage::sprite::Sprite;
use std::sync::Arc;

fn arm_skeleton() -> Skeleton {
    let mut skeleton = Skeleton::new();
    let upper = skeleton.add_bone("upper_arm", 0).expect("upper arm");
    skeleton.add_bone("forearm", upper).expect("forearm");
    skeleton
}

fn load_clips() -> (Arc<AnimationClip>, Arc<AnimationClip>, Arc<AnimationClip>) {
    let mut store = ClipStore::new();
    let wave = store.load_clip("wave", "fixtures/animation_clips/arm_wave.json").expect("wave");
    let rest = store.load_clip("rest", "fixtures/animation_clips/arm_rest.json").expect("rest");
    let hop = store.load_clip("hop", "fixtures/animation_clips/hop.json").expect("hop");
    (wave, rest, hop)
}

fn spawn_rig(world: &mut SceneWorld, autoplay: &str) -> EntityId {
    let (wave, rest, hop) = load_clips();
    let mut animator = Animator::new().with_autoplay(autoplay);
    for clip in [wave, rest, hop] {
        animator.add_clip(clip);
    }
    let rig = world.spawn("rig");
    world.add_component(rig, arm_skeleton());
    world.add_component(rig, animator);
    rig
}

fn bone_rotation(world: &SceneWorld, entity: EntityId, bone: &str) -> f32 {
    world
        .get_component::<Skeleton>(entity)
        .and_then(|skeleton| skeleton.bone_named(bone))
        .map(|bone| bone.rotation)
        .expect("bone exists")
}

#[test]
fn autoplay_starts_on_first_tick_and_poses_bones() {
    let mut world = SceneWorld::new();
    let rig = spawn_rig(&mut world, "rest");
    assert_eq!(world.get_component::<Animator>(rig).map(Animator::state), Some(AnimatorState::Idle));

    world.tick(0.1);
    let animator = world.get_component::<Animator>(rig).expect("animator");
    assert_eq!(animator.current_clip(), Some("rest"));
    assert_eq!(animator.state(), AnimatorState::Playing);
    assert_abs_diff_eq!(bone_rotation(&world, rig, "upper_arm"), -90.0, epsilon = 1e-4);
    assert_abs_diff_eq!(bone_rotation(&world, rig, "forearm"), 10.0, epsilon = 1e-4);
}

#[test]
fn cross_fade_starts_from_the_previous_pose() {
    let mut world = SceneWorld::new();
    let rig = spawn_rig(&mut world, "rest");
    world.tick(0.1);

    let animator = world.get_component_mut::<Animator>(rig).expect("animator");
    assert!(animator.cross_fade("wave", 0.2));
    assert_eq!(animator.state(), AnimatorState::Transitioning);
    let upper = Target::bone("upper_arm");
    let at_start = animator.sample(&upper, Property::Rotation).expect("blended sample");
    assert_abs_diff_eq!(at_start, -90.0, epsilon = 1e-4);

    // Small steps never jump: each frame moves a bounded amount toward the new clip.
    let mut last = bone_rotation(&world, rig, "upper_arm");
    for _ in 0..12 {
        world.tick(0.02);
        let now = bone_rotation(&world, rig, "upper_arm");
        assert!((now - last).abs() < 15.0, "pose jumped from {last} to {now}");
        last = now;
    }

    let animator = world.get_component::<Animator>(rig).expect("animator");
    assert_eq!(animator.state(), AnimatorState::Playing);
    assert_eq!(animator.previous_clip(), None);
    let expected = animator.sample(&upper, Property::Rotation).expect("sample");
    assert_abs_diff_eq!(bone_rotation(&world, rig, "upper_arm"), expected, epsilon = 1e-4);
}

#[test]
fn halfway_through_a_fade_blends_evenly() {
    let (wave, rest, _) = load_clips();
    let mut animator = Animator::new();
    animator.add_clip(wave);
    animator.add_clip(rest);
    animator.play("rest");
    animator.cross_fade("wave", 0.5);
    animator.advance(0.25);

    let upper = Target::bone("upper_arm");
    let from: f32 = -90.0;
    let to: f32 = 22.5;
    let blended = animator.sample(&upper, Property::Rotation).expect("sample");
    assert_abs_diff_eq!(animator.blend_alpha(), 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(blended, from + (to - from) * 0.5, epsilon = 1e-3);
}

#[test]
fn speed_scales_time_and_mix() {
    let (wave, rest, _) = load_clips();
    let mut animator = Animator::new();
    animator.add_clip(wave);
    animator.add_clip(rest);
    animator.set_speed(2.0);
    animator.play("rest");
    animator.cross_fade("wave", 0.4);
    animator.advance(0.1);
    assert_abs_diff_eq!(animator.current_time(), 0.2, epsilon = 1e-6);
    assert_abs_diff_eq!(animator.blend_alpha(), 0.5, epsilon = 1e-6);
}

#[test]
fn one_shot_clip_finishes_once_and_drives_self_and_sprite() {
    let mut world = SceneWorld::new();
    let (_, _, hop) = load_clips();
    let hero = world.spawn("hero");
    world.add_component(hero, Sprite::new("hop_0.png"));
    world.add_component(hero, Animator::new().with_clip((*hop).clone()).with_autoplay("hop"));

    world.tick(0.125);
    let y = world.transform(hero).expect("transform").translation.y;
    assert!(y > 0.0 && y < 8.0, "mid-hop height {y}");

    world.tick(0.25);
    let sprite = world.get_component::<Sprite>(hero).expect("sprite");
    assert_eq!(sprite.path(), "hop_1.png");
    assert!(sprite.frame().is_some());

    world.tick(0.25);
    world.tick(0.25);
    let finished: Vec<StageEvent> = world
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, StageEvent::ClipFinished { .. }))
        .collect();
    assert_eq!(finished, vec![StageEvent::ClipFinished { entity: hero, clip: "hop".to_string() }]);
    let animator = world.get_component::<Animator>(hero).expect("animator");
    assert_eq!(animator.current_time(), 0.5);
    assert_eq!(world.transform(hero).expect("transform").translation.y, 0.0);
}

#[test]
fn unknown_autoplay_clip_emits_missing_event() {
    let mut world = SceneWorld::new();
    let rig = spawn_rig(&mut world, "dance");
    world.tick(0.016);
    let events = world.drain_events();
    assert!(events.contains(&StageEvent::ClipMissing { entity: rig, clip: "dance".to_string() }));
    assert_eq!(world.get_component::<Animator>(rig).map(Animator::state), Some(AnimatorState::Idle));
}

#[test]
fn timelines_for_missing_bones_bind_once_the_bone_appears() {
    let tail = Timeline::new(
        Target::bone("tail"),
        Property::Rotation,
        vec![Keyframe::scalar(0.0, 30.0, Curve::Linear)],
    )
    .expect("tail timeline");
    let arm = Timeline::new(
        Target::bone("upper_arm"),
        Property::X,
        vec![Keyframe::scalar(0.0, 2.0, Curve::Linear)],
    )
    .expect("arm timeline");
    let clip = AnimationClip::new("wag", 1.0, true, vec![tail, arm]);

    let mut world = SceneWorld::new();
    let rig = world.spawn("rig");
    world.add_component(rig, arm_skeleton());
    world.add_component(rig, Animator::new().with_clip(clip).with_autoplay("wag"));
    world.tick(0.016);
    let skeleton = world.get_component::<Skeleton>(rig).expect("skeleton");
    assert_eq!(skeleton.bone_named("upper_arm").map(|b| b.x), Some(2.0));
    assert!(skeleton.bone_named("tail").is_none());

    world.get_component_mut::<Skeleton>(rig).expect("skeleton").add_bone("tail", 0).expect("tail bone");
    world.tick(0.016);
    assert_abs_diff_eq!(bone_rotation(&world, rig, "tail"), 30.0, epsilon = 1e-5);
}

#[test]
fn stopped_animator_leaves_pose_alone() {
    let mut world = SceneWorld::new();
    let rig = spawn_rig(&mut world, "wave");
    world.tick(0.25);
    let posed = bone_rotation(&world, rig, "upper_arm");
    world.get_component_mut::<Animator>(rig).expect("animator").stop();
    world.tick(0.25);
    let animator = world.get_component::<Animator>(rig).expect("animator");
    assert_abs_diff_eq!(animator.current_time(), 0.25, epsilon = 1e-6);
    assert_abs_diff_eq!(bone_rotation(&world, rig, "upper_arm"), posed, epsilon = 1e-6);
}
