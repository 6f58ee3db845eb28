//! Bone hierarchy driven by an entity's world transform, plus slots drawn in an
//! explicit order that is independent of the hierarchy.

use crate::animation::Property;
use crate::assets::DrawableHandle;
use crate::ecs::{compose, Behaviour, BehaviourCtx, StageError, Transform, WorldTransform};
use glam::{Affine2, Vec2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const ROOT_BONE: &str = "root";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SkinShape {
    None,
    Rect { width: f32, height: f32 },
    Circle { radius: f32 },
    Sprite { path: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Skin {
    pub shape: SkinShape,
    pub color: [f32; 4],
    pub frame: Option<DrawableHandle>,
}

impl Default for Skin {
    fn default() -> Self {
        Self { shape: SkinShape::None, color: [1.0; 4], frame: None }
    }
}

impl Skin {
    pub fn sprite_path(&self) -> Option<&str> {
        match &self.shape {
            SkinShape::Sprite { path } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Switches to a sprite skin. Returns the handle that was replaced.
    pub fn set_frame(&mut self, path: &str, handle: Option<DrawableHandle>) -> Option<DrawableHandle> {
        self.shape = SkinShape::Sprite { path: path.to_string() };
        std::mem::replace(&mut self.frame, handle)
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub x: f32,
    pub y: f32,
    /// Degrees.
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub length: f32,
    pub skin: Skin,
    pub world: WorldTransform,
}

impl Bone {
    fn new(name: &str, parent: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            length: 0.0,
            skin: Skin::default(),
            world: WorldTransform::default(),
        }
    }

    pub fn local_transform(&self) -> Transform {
        Transform {
            translation: Vec2::new(self.x, self.y),
            rotation: self.rotation,
            scale: Vec2::new(self.scale_x, self.scale_y),
        }
    }

    pub fn property(&self, property: Property) -> Option<f32> {
        match property {
            Property::X => Some(self.x),
            Property::Y => Some(self.y),
            Property::Rotation => Some(self.rotation),
            Property::ScaleX => Some(self.scale_x),
            Property::ScaleY => Some(self.scale_y),
            Property::Frame => None,
        }
    }

    pub fn set_property(&mut self, property: Property, value: f32) {
        match property {
            Property::X => self.x = value,
            Property::Y => self.y = value,
            Property::Rotation => self.rotation = value,
            Property::ScaleX => self.scale_x = value,
            Property::ScaleY => self.scale_y = value,
            Property::Frame => {}
        }
    }

    /// Point at the far end of the bone in world space.
    pub fn world_tip(&self) -> Vec2 {
        self.world.matrix.transform_point2(Vec2::new(self.length, 0.0))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub name: String,
    pub bone: usize,
    pub visible: bool,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    bones: Vec<Bone>,
    by_name: HashMap<String, usize>,
    update_order: Vec<usize>,
    slots: Vec<Slot>,
    draw_order: Vec<usize>,
    revision: u64,
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new()
    }
}

impl Skeleton {
    pub fn new() -> Self {
        Self::with_root(ROOT_BONE)
    }

    pub fn with_root(name: &str) -> Self {
        let mut by_name = HashMap::new();
        by_name.insert(name.to_string(), 0);
        Self {
            bones: vec![Bone::new(name, None)],
            by_name,
            update_order: vec![0],
            slots: Vec::new(),
            draw_order: Vec::new(),
            revision: 0,
        }
    }

    /// Bumped whenever bones or slots are added or re-parented.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn root(&self) -> &Bone {
        &self.bones[0]
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.bones.get_mut(index)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn bone_named(&self, name: &str) -> Option<&Bone> {
        self.find_bone(name).and_then(|index| self.bones.get(index))
    }

    pub fn bone_named_mut(&mut self, name: &str) -> Option<&mut Bone> {
        let index = self.find_bone(name)?;
        self.bones.get_mut(index)
    }

    /// Adds a bone under `parent`. Bone names are unique within a skeleton.
    pub fn add_bone(&mut self, name: &str, parent: usize) -> Option<usize> {
        if parent >= self.bones.len() || self.by_name.contains_key(name) {
            return None;
        }
        let index = self.bones.len();
        self.bones.push(Bone::new(name, Some(parent)));
        self.by_name.insert(name.to_string(), index);
        self.update_order.push(index);
        self.revision += 1;
        Some(index)
    }

    fn is_descendant(&self, bone: usize, ancestor: usize) -> bool {
        let mut cursor = self.bones.get(bone).and_then(|b| b.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.bones[current].parent;
        }
        false
    }

    /// Re-parents a non-root bone. Draw order is untouched.
    pub fn set_bone_parent(&mut self, bone: usize, parent: usize) -> bool {
        if bone == 0 || bone >= self.bones.len() || parent >= self.bones.len() {
            return false;
        }
        if bone == parent || self.is_descendant(parent, bone) {
            return false;
        }
        self.bones[bone].parent = Some(parent);
        self.rebuild_update_order();
        self.revision += 1;
        true
    }

    fn rebuild_update_order(&mut self) {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.bones.len()];
        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                children[parent].push(index);
            }
        }
        self.update_order.clear();
        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            self.update_order.push(index);
            stack.extend(children[index].iter().rev().copied());
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    /// Adds a slot bound to `bone`, drawn after every existing slot.
    pub fn add_slot(&mut self, name: &str, bone: usize) -> Option<usize> {
        if bone >= self.bones.len() || self.find_slot(name).is_some() {
            return None;
        }
        let index = self.slots.len();
        self.slots.push(Slot { name: name.to_string(), bone, visible: true });
        self.draw_order.push(index);
        self.revision += 1;
        Some(index)
    }

    pub fn draw_order(&self) -> &[usize] {
        &self.draw_order
    }

    /// Moves `slot` to `position` in the draw order (clamped to the end).
    pub fn set_draw_order_index(&mut self, slot: usize, position: usize) -> bool {
        let Some(current) = self.draw_order.iter().position(|s| *s == slot) else {
            return false;
        };
        let entry = self.draw_order.remove(current);
        let position = position.min(self.draw_order.len());
        self.draw_order.insert(position, entry);
        true
    }

    pub fn draw_order_slots(&self) -> impl Iterator<Item = &Slot> {
        self.draw_order.iter().filter_map(|index| self.slots.get(*index))
    }

    /// Copies the entity pose onto the root bone, then recomputes every bone's world
    /// pose parent-first.
    pub fn update_world(&mut self, entity_world: &WorldTransform) {
        let root = &mut self.bones[0];
        root.x = entity_world.position.x;
        root.y = entity_world.position.y;
        root.rotation = entity_world.rotation;
        root.scale_x = entity_world.scale.x;
        root.scale_y = entity_world.scale.y;
        for order in 0..self.update_order.len() {
            let index = self.update_order[order];
            let parent = self.bones[index]
                .parent
                .map(|parent| self.bones[parent].world.matrix)
                .unwrap_or(Affine2::IDENTITY);
            let local = self.bones[index].local_transform();
            self.bones[index].world = WorldTransform::from_matrix(compose(&parent, &local));
        }
    }

    fn skin_paths(&self) -> Vec<(usize, String)> {
        self.bones
            .iter()
            .enumerate()
            .filter_map(|(index, bone)| bone.skin.sprite_path().map(|path| (index, path.to_string())))
            .collect()
    }

    fn to_data(&self) -> SkeletonData {
        SkeletonData {
            bones: self
                .update_order
                .iter()
                .map(|&index| &self.bones[index])
                .map(|bone| BoneData {
                    name: bone.name.clone(),
                    parent: bone.parent.map(|p| self.bones[p].name.clone()),
                    x: bone.x,
                    y: bone.y,
                    rotation: bone.rotation,
                    scale_x: bone.scale_x,
                    scale_y: bone.scale_y,
                    length: bone.length,
                    skin: bone.skin.shape.clone(),
                    color: bone.skin.color,
                })
                .collect(),
            slots: self
                .slots
                .iter()
                .map(|slot| SlotData {
                    name: slot.name.clone(),
                    bone: self.bones[slot.bone].name.clone(),
                    visible: slot.visible,
                })
                .collect(),
            draw_order: self.draw_order.iter().filter_map(|i| self.slots.get(*i)).map(|s| s.name.clone()).collect(),
        }
    }

    fn from_data(data: SkeletonData) -> Self {
        let mut bones = data.bones.into_iter();
        let mut skeleton = match bones.next() {
            Some(root) => {
                let mut skeleton = Skeleton::with_root(&root.name);
                root.apply_to(&mut skeleton.bones[0]);
                skeleton
            }
            None => Skeleton::new(),
        };
        // Hand-written data may list a child before its parent; keep sweeping while bones land.
        let mut pending: Vec<BoneData> = bones.collect();
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for bone in pending {
                let Some(parent) = bone.parent.as_deref().and_then(|name| skeleton.find_bone(name)) else {
                    waiting.push(bone);
                    continue;
                };
                match skeleton.add_bone(&bone.name, parent) {
                    Some(index) => bone.apply_to(&mut skeleton.bones[index]),
                    None => log::warn!("skeleton: duplicate bone '{}' skipped", bone.name),
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for bone in pending {
            log::warn!("skeleton: bone '{}' has unknown parent {:?}; skipped", bone.name, bone.parent);
        }
        for slot in data.slots {
            let Some(bone) = skeleton.find_bone(&slot.bone) else {
                log::warn!("skeleton: slot '{}' references missing bone '{}'; skipped", slot.name, slot.bone);
                continue;
            };
            if let Some(index) = skeleton.add_slot(&slot.name, bone) {
                skeleton.slots[index].visible = slot.visible;
            }
        }
        if !data.draw_order.is_empty() {
            let mut order: Vec<usize> = data.draw_order.iter().filter_map(|name| skeleton.find_slot(name)).collect();
            order.dedup();
            for index in 0..skeleton.slots.len() {
                if !order.contains(&index) {
                    order.push(index);
                }
            }
            skeleton.draw_order = order;
        }
        skeleton
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoneData {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "one")]
    scale_x: f32,
    #[serde(default = "one")]
    scale_y: f32,
    #[serde(default)]
    length: f32,
    #[serde(default = "no_skin")]
    skin: SkinShape,
    #[serde(default = "white")]
    color: [f32; 4],
}

impl BoneData {
    fn apply_to(self, bone: &mut Bone) {
        bone.x = self.x;
        bone.y = self.y;
        bone.rotation = self.rotation;
        bone.scale_x = self.scale_x;
        bone.scale_y = self.scale_y;
        bone.length = self.length;
        bone.skin = Skin { shape: self.skin, color: self.color, frame: None };
    }
}

#[derive(Serialize, Deserialize)]
struct SlotData {
    name: String,
    bone: String,
    #[serde(default = "visible")]
    visible: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkeletonData {
    #[serde(default)]
    bones: Vec<BoneData>,
    #[serde(default)]
    slots: Vec<SlotData>,
    #[serde(default)]
    draw_order: Vec<String>,
}

const fn one() -> f32 {
    1.0
}

const fn visible() -> bool {
    true
}

const fn white() -> [f32; 4] {
    [1.0; 4]
}

fn no_skin() -> SkinShape {
    SkinShape::None
}

impl Behaviour for Skeleton {
    fn type_name(&self) -> &'static str {
        "Skeleton"
    }

    fn on_awake(&mut self, ctx: &mut BehaviourCtx<'_>) {
        for (index, path) in self.skin_paths() {
            let handle = ctx.world.resolve_drawable(&path);
            self.bones[index].skin.frame = handle;
        }
    }

    fn on_update(&mut self, ctx: &mut BehaviourCtx<'_>, _dt: f32) {
        if let Some(world) = ctx.world.world_transform(ctx.entity) {
            self.update_world(&world);
        }
    }

    fn on_destroy(&mut self, ctx: &mut BehaviourCtx<'_>) {
        for bone in &mut self.bones {
            if let Some(handle) = bone.skin.frame.take() {
                ctx.world.release_drawable(handle);
            }
        }
    }

    fn save(&self) -> Option<Value> {
        serde_json::to_value(self.to_data()).ok()
    }

    fn load(&mut self, data: &Value) -> Result<(), StageError> {
        let parsed: SkeletonData =
            serde_json::from_value(data.clone()).map_err(|err| StageError::invalid_data("Skeleton", err))?;
        *self = Skeleton::from_data(parsed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_bone_names_are_rejected() {
        let mut skeleton = Skeleton::new();
        assert_eq!(skeleton.add_bone("arm", 0), Some(1));
        assert_eq!(skeleton.add_bone("arm", 0), None);
        assert_eq!(skeleton.add_bone("hand", 7), None);
    }

    #[test]
    fn reparent_rejects_cycles_and_keeps_draw_order() {
        let mut skeleton = Skeleton::new();
        let upper = skeleton.add_bone("upper", 0).unwrap();
        let lower = skeleton.add_bone("lower", upper).unwrap();
        let other = skeleton.add_bone("other", 0).unwrap();
        skeleton.add_slot("a", lower).unwrap();
        skeleton.add_slot("b", other).unwrap();
        let before = skeleton.draw_order().to_vec();

        assert!(!skeleton.set_bone_parent(upper, lower));
        assert!(!skeleton.set_bone_parent(0, other));
        assert!(skeleton.set_bone_parent(upper, other));
        assert_eq!(skeleton.bone(upper).unwrap().parent, Some(other));
        assert_eq!(skeleton.draw_order(), before.as_slice());
    }

    #[test]
    fn draw_order_moves_slots() {
        let mut skeleton = Skeleton::new();
        for name in ["back", "body", "front"] {
            skeleton.add_slot(name, 0).unwrap();
        }
        assert!(skeleton.set_draw_order_index(2, 0));
        let names: Vec<&str> = skeleton.draw_order_slots().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["front", "back", "body"]);
        assert!(skeleton.set_draw_order_index(2, 99));
        let names: Vec<&str> = skeleton.draw_order_slots().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["back", "body", "front"]);
    }

    #[test]
    fn saved_data_rebuilds_the_same_hierarchy() {
        let mut skeleton = Skeleton::new();
        let arm = skeleton.add_bone("arm", 0).unwrap();
        skeleton.bone_mut(arm).unwrap().x = 12.0;
        skeleton.bone_mut(arm).unwrap().skin.shape = SkinShape::Rect { width: 4.0, height: 10.0 };
        skeleton.add_slot("arm_slot", arm).unwrap();
        let value = skeleton.save().expect("skeleton serializes");

        let mut loaded = Skeleton::new();
        loaded.load(&value).expect("load");
        let arm = loaded.bone_named("arm").expect("arm bone");
        assert_eq!(arm.parent, Some(0));
        assert_eq!(arm.x, 12.0);
        assert_eq!(arm.skin.shape, SkinShape::Rect { width: 4.0, height: 10.0 });
        assert_eq!(loaded.slots()[0].bone, 1);
    }

    #[test]
    fn bones_listed_before_their_parent_still_load() {
        let value = json!({
            "bones": [
                { "name": "root" },
                { "name": "hand", "parent": "arm", "x": 3.0 },
                { "name": "arm", "parent": "root" },
                { "name": "lost", "parent": "nowhere" }
            ]
        });
        let mut loaded = Skeleton::new();
        loaded.load(&value).expect("load");
        let names: Vec<&str> = loaded.bones().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["root", "arm", "hand"]);
        let arm = loaded.find_bone("arm");
        assert_eq!(loaded.bone_named("hand").and_then(|b| b.parent), arm);
    }
}
