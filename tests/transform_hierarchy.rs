use approx::assert_abs_diff_eq;
use glam::Vec2;
use kestrel_stage::ecs::{SceneWorld, StageError, Transform};
use kestrel_stage::events::StageEvent;

fn approx_vec2(a: Vec2, b: Vec2) -> bool {
    (a - b).length_squared() <= 1e-6
}

#[test]
fn child_offset_composes_with_parent() {
    let mut world = SceneWorld::new();
    let parent = world.spawn("parent");
    let child = world.spawn_child(parent, "child");
    world.set_transform(parent, Transform::from_translation(Vec2::new(10.0, 0.0)));
    world.set_transform(child, Transform::from_translation(Vec2::new(5.0, 0.0)));
    world.tick(0.016);

    let position = world.world_position(child).expect("child world position");
    assert!(approx_vec2(position, Vec2::new(15.0, 0.0)), "got {position}");
}

#[test]
fn rotation_and_scale_propagate() {
    let mut world = SceneWorld::new();
    let parent = world.spawn("parent");
    let child = world.spawn_child(parent, "child");
    world.set_transform(parent, Transform::default().with_rotation(90.0).with_scale(Vec2::splat(2.0)));
    world.set_transform(child, Transform::from_translation(Vec2::new(1.0, 0.0)).with_rotation(45.0));
    world.tick(0.016);

    let pose = world.world_transform(child).expect("child pose");
    assert!(approx_vec2(pose.position, Vec2::new(0.0, 2.0)), "got {}", pose.position);
    assert_abs_diff_eq!(pose.rotation, 135.0, epsilon = 1e-3);
    assert!(approx_vec2(pose.scale, Vec2::splat(2.0)));
}

#[test]
fn world_setters_round_trip_through_parent() {
    let mut world = SceneWorld::new();
    let parent = world.spawn("parent");
    let child = world.spawn_child(parent, "child");
    world.set_transform(
        parent,
        Transform::from_translation(Vec2::new(3.0, -2.0)).with_rotation(30.0).with_scale(Vec2::new(2.0, 0.5)),
    );
    world.tick(0.016);

    assert!(world.set_world_position(child, Vec2::new(7.0, 4.0)));
    assert!(world.set_world_rotation(child, 10.0));
    world.tick(0.016);
    let pose = world.world_transform(child).expect("child pose");
    assert!(approx_vec2(pose.position, Vec2::new(7.0, 4.0)), "got {}", pose.position);
    assert_abs_diff_eq!(pose.rotation, 10.0, epsilon = 1e-3);
}

#[test]
fn world_setters_round_trip_through_a_deep_chain() {
    let mut world = SceneWorld::new();
    let poses = [
        (Vec2::new(3.0, -2.0), 30.0, 2.0),
        (Vec2::new(-1.5, 4.0), -75.0, 0.5),
        (Vec2::new(6.0, 1.0), 120.0, 1.5),
        (Vec2::new(0.5, -3.0), 15.0, 0.8),
    ];
    let mut parent = None;
    for (depth, (offset, rotation, scale)) in poses.into_iter().enumerate() {
        let name = format!("chain_{depth}");
        let link = match parent {
            Some(parent) => world.spawn_child(parent, name),
            None => world.spawn(name),
        };
        let local = Transform::from_translation(offset).with_rotation(rotation).with_scale(Vec2::splat(scale));
        world.set_transform(link, local);
        parent = Some(link);
    }
    let leaf = world.spawn_child(parent.expect("chain root"), "leaf");
    world.tick(0.016);

    assert!(world.set_world_position(leaf, Vec2::new(-4.0, 9.0)));
    assert!(world.set_world_rotation(leaf, -40.0));
    assert!(world.set_world_scale(leaf, Vec2::splat(3.0)));
    world.tick(0.016);
    let pose = world.world_transform(leaf).expect("leaf pose");
    assert!(approx_vec2(pose.position, Vec2::new(-4.0, 9.0)), "got {}", pose.position);
    assert_abs_diff_eq!(pose.rotation, -40.0, epsilon = 1e-2);
    assert!(approx_vec2(pose.scale, Vec2::splat(3.0)), "got {}", pose.scale);
}

#[test]
fn local_changes_show_up_in_world_next_frame() {
    let mut world = SceneWorld::new();
    let entity = world.spawn("mover");
    world.tick(0.016);
    world.transform_mut(entity).expect("transform").translation.x = 4.0;
    assert_eq!(world.world_position(entity), Some(Vec2::ZERO));
    world.tick(0.016);
    assert_eq!(world.world_position(entity), Some(Vec2::new(4.0, 0.0)));
}

#[test]
fn reparent_keep_world_preserves_pose() {
    let mut world = SceneWorld::new();
    let a = world.spawn("a");
    let b = world.spawn("b");
    let item = world.spawn_child(a, "item");
    world.set_transform(a, Transform::from_translation(Vec2::new(10.0, 0.0)));
    world.set_transform(b, Transform::from_translation(Vec2::new(0.0, 5.0)).with_rotation(90.0));
    world.set_transform(item, Transform::from_translation(Vec2::new(1.0, 1.0)));
    world.tick(0.016);
    let before = world.world_transform(item).expect("pose before");

    world.set_parent_keep_world(item, Some(b)).expect("reparent");
    world.tick(0.016);
    let after = world.world_transform(item).expect("pose after");
    assert!(approx_vec2(before.position, after.position), "{} vs {}", before.position, after.position);
    assert_abs_diff_eq!(before.rotation, after.rotation, epsilon = 1e-3);
    assert_eq!(world.parent(item), Some(b));
    assert!(world.children(a).is_empty());
}

#[test]
fn plain_reparent_keeps_local_values() {
    let mut world = SceneWorld::new();
    let a = world.spawn("a");
    let b = world.spawn("b");
    let item = world.spawn_child(a, "item");
    world.set_transform(b, Transform::from_translation(Vec2::new(0.0, 5.0)));
    world.set_transform(item, Transform::from_translation(Vec2::new(1.0, 0.0)));
    world.drain_events();

    world.set_parent(item, Some(b)).expect("reparent");
    world.tick(0.016);
    assert_eq!(world.transform(item).map(|t| t.translation), Some(Vec2::new(1.0, 0.0)));
    assert_eq!(world.world_position(item), Some(Vec2::new(1.0, 5.0)));
    assert_eq!(world.drain_events(), vec![StageEvent::ParentChanged { entity: item, parent: Some(b) }]);

    world.set_parent(item, None).expect("unparent");
    assert_eq!(world.roots(), vec![a, b, item]);
}

#[test]
fn cycles_are_rejected() {
    let mut world = SceneWorld::new();
    let root = world.spawn("root");
    let mid = world.spawn_child(root, "mid");
    let leaf = world.spawn_child(mid, "leaf");

    let err = world.set_parent(root, Some(leaf)).unwrap_err();
    assert!(matches!(err, StageError::HierarchyCycle { .. }));
    assert!(world.set_parent(mid, Some(mid)).is_err());
    assert_eq!(world.parent(leaf), Some(mid));
    assert_eq!(world.roots(), vec![root]);
}

#[test]
fn mirrored_scale_decomposes_with_negative_y() {
    let mut world = SceneWorld::new();
    let entity = world.spawn("mirror");
    world.set_transform(entity, Transform::default().with_scale(Vec2::new(1.0, -3.0)));
    world.tick(0.016);
    let scale = world.world_scale(entity).expect("scale");
    assert!(approx_vec2(scale, Vec2::new(1.0, -3.0)), "got {scale}");
}
