use super::behaviour::Behaviour;
use crate::identity::{Identity, ObjectId};
use bevy_ecs::prelude::*;
use bitflags::bitflags;
use glam::{Affine2, Vec2};
use smallvec::SmallVec;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

/// Handle to a scene entity. Stops resolving once the entity is hard-destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub(crate) Entity);

impl EntityId {
    pub fn raw(self) -> Entity {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

/// Handle to a component attached to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) Entity);

impl ComponentId {
    pub fn raw(self) -> Entity {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component {}", self.0)
    }
}

#[derive(Component, Clone, Debug)]
pub struct Node {
    pub identity: Identity,
    pub tag: String,
    pub layer: i32,
    pub active: bool,
    pub destroyed: bool,
    /// Survives `clear_scene` and is left out of scene exports.
    pub persistent: bool,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identity: Identity::new(name),
            tag: String::new(),
            layer: 0,
            active: true,
            destroyed: false,
            persistent: false,
        }
    }
}

/// Local pose relative to the parent. Rotation is in degrees.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self { translation: Vec2::ZERO, rotation: 0.0, scale: Vec2::ONE }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec2) -> Self {
        Self { translation, ..Self::default() }
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }
}

/// Cached world pose, derived from the parent chain once per frame.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct WorldTransform {
    pub matrix: Affine2,
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for WorldTransform {
    fn default() -> Self {
        Self { matrix: Affine2::IDENTITY, position: Vec2::ZERO, rotation: 0.0, scale: Vec2::ONE }
    }
}

#[derive(Component, Clone, Copy, Debug)]
pub struct Parent(pub Entity);

#[derive(Component, Default, Debug)]
pub struct Children(pub Vec<Entity>);

/// Components attached to an entity, in attachment order and grouped by concrete type.
#[derive(Component, Default, Debug)]
pub struct Attachments {
    pub order: Vec<Entity>,
    pub by_type: HashMap<TypeId, SmallVec<[Entity; 2]>>,
}

impl Attachments {
    pub fn push(&mut self, type_id: TypeId, component: Entity) {
        self.order.push(component);
        self.by_type.entry(type_id).or_default().push(component);
    }

    pub fn remove(&mut self, type_id: TypeId, component: Entity) {
        self.order.retain(|c| *c != component);
        if let Some(list) = self.by_type.get_mut(&type_id) {
            list.retain(|c| *c != component);
            if list.is_empty() {
                self.by_type.remove(&type_id);
            }
        }
    }

    pub fn of_type(&self, type_id: TypeId) -> &[Entity] {
        self.by_type.get(&type_id).map(|list| list.as_slice()).unwrap_or(&[])
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct LifecycleFlags: u8 {
        const ENABLED = 1 << 0;
        const AWAKE = 1 << 1;
        const STARTED = 1 << 2;
        /// onEnable has fired and onDisable has not.
        const LIVE = 1 << 3;
        const REGISTERED = 1 << 4;
        const DESTROYED = 1 << 5;
    }
}

/// Storage record for one attached component.
#[derive(Component)]
pub struct Attachment {
    pub owner: Entity,
    pub identity: Identity,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub flags: LifecycleFlags,
    /// `None` only while the behaviour is checked out for a callback.
    pub behaviour: Option<Box<dyn Behaviour>>,
}

impl Attachment {
    pub fn id(&self) -> ObjectId {
        self.identity.id()
    }

    pub fn is_destroyed(&self) -> bool {
        self.flags.contains(LifecycleFlags::DESTROYED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_keep_order_and_group_duplicates() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let b = world.spawn_empty().id();
        let c = world.spawn_empty().id();
        let mut attachments = Attachments::default();
        attachments.push(TypeId::of::<u8>(), a);
        attachments.push(TypeId::of::<u16>(), b);
        attachments.push(TypeId::of::<u8>(), c);
        assert_eq!(attachments.order, vec![a, b, c]);
        assert_eq!(attachments.of_type(TypeId::of::<u8>()), &[a, c]);

        attachments.remove(TypeId::of::<u8>(), a);
        assert_eq!(attachments.order, vec![b, c]);
        assert_eq!(attachments.of_type(TypeId::of::<u8>()), &[c]);
        attachments.remove(TypeId::of::<u8>(), c);
        assert!(attachments.of_type(TypeId::of::<u8>()).is_empty());
        assert!(!attachments.by_type.contains_key(&TypeId::of::<u8>()));
    }
}
