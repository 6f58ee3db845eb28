//! Flattens the scene into an ordered list of things to draw. Rendering itself lives
//! elsewhere; this only decides what is visible, where, and in which order.

use crate::assets::DrawableHandle;
use crate::ecs::{EntityId, LifecycleFlags, SceneWorld, WorldTransform};
use crate::skeleton::{Skeleton, SkinShape};
use crate::sprite::Sprite;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, PartialEq)]
pub enum DrawKind {
    Sprite { path: String, frame: Option<DrawableHandle>, color: [f32; 4], flip_x: bool },
    Slot { slot: String, bone: String, shape: SkinShape, frame: Option<DrawableHandle>, color: [f32; 4] },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    pub entity: EntityId,
    pub layer: i32,
    pub transform: WorldTransform,
    pub kind: DrawKind,
}

fn is_live(world: &SceneWorld, id: crate::ecs::ComponentId) -> bool {
    world.component_flags(id).map(|flags| flags.contains(LifecycleFlags::LIVE)).unwrap_or(false)
}

/// Visible sprites and skeleton slots, sorted by layer then hierarchy pre-order.
/// Skeleton slots follow the skeleton's draw order.
pub fn collect_draw_items(world: &SceneWorld) -> Vec<DrawItem> {
    let mut candidates: BTreeSet<EntityId> = world.entities_with::<Sprite>().into_iter().collect();
    candidates.extend(world.entities_with::<Skeleton>());
    if candidates.is_empty() {
        return Vec::new();
    }
    let order: HashMap<EntityId, usize> =
        world.preorder().into_iter().enumerate().map(|(index, entity)| (entity, index)).collect();

    let mut items = Vec::new();
    for entity in candidates {
        if !world.is_active_in_hierarchy(entity) {
            continue;
        }
        let (Some(layer), Some(transform)) = (world.layer(entity), world.world_transform(entity)) else {
            continue;
        };
        for id in world.components_of::<Sprite>(entity) {
            let Some(sprite) = world.component::<Sprite>(id).filter(|_| is_live(world, id)) else {
                continue;
            };
            items.push(DrawItem {
                entity,
                layer,
                transform,
                kind: DrawKind::Sprite {
                    path: sprite.path().to_string(),
                    frame: sprite.frame(),
                    color: sprite.color,
                    flip_x: sprite.flip_x,
                },
            });
        }
        for id in world.components_of::<Skeleton>(entity) {
            let Some(skeleton) = world.component::<Skeleton>(id).filter(|_| is_live(world, id)) else {
                continue;
            };
            for slot in skeleton.draw_order_slots().filter(|slot| slot.visible) {
                let Some(bone) = skeleton.bone(slot.bone) else {
                    continue;
                };
                if bone.skin.shape == SkinShape::None {
                    continue;
                }
                items.push(DrawItem {
                    entity,
                    layer,
                    transform: bone.world,
                    kind: DrawKind::Slot {
                        slot: slot.name.clone(),
                        bone: bone.name.clone(),
                        shape: bone.skin.shape.clone(),
                        frame: bone.skin.frame,
                        color: bone.skin.color,
                    },
                });
            }
        }
    }
    // Stable: items of one entity keep their emission order.
    items.sort_by_key(|item| (item.layer, order.get(&item.entity).copied().unwrap_or(usize::MAX)));
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_sort_before_hierarchy_order() {
        let mut world = SceneWorld::new();
        let back = world.spawn("back");
        let front = world.spawn("front");
        world.add_component(back, Sprite::new("bg.png"));
        world.add_component(front, Sprite::new("hero.png"));
        world.set_layer(back, 5);
        world.tick(0.0);

        let items = collect_draw_items(&world);
        let entities: Vec<EntityId> = items.iter().map(|item| item.entity).collect();
        assert_eq!(entities, vec![front, back]);
    }

    #[test]
    fn inactive_and_disabled_are_skipped() {
        let mut world = SceneWorld::new();
        let a = world.spawn("a");
        let b = world.spawn("b");
        world.add_component(a, Sprite::new("a.png"));
        let sprite_b = world.add_component(b, Sprite::new("b.png")).unwrap();
        world.set_active(a, false);
        world.set_component_enabled(sprite_b, false);
        assert!(collect_draw_items(&world).is_empty());
    }
}
