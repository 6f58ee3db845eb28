use super::behaviour::{downcast_mut, downcast_ref, Behaviour, BehaviourCtx};
use super::error::StageError;
use super::profiler::FrameProfiler;
use super::registry::ComponentRegistry;
use super::transform::compose;
use super::types::*;
use crate::assets::{AssetTracker, DrawableHandle, PathAssetTracker};
use crate::events::{EventBus, StageEvent};
use crate::identity::{Identity, ObjectId};
use bevy_ecs::prelude::{Entity, World};
use glam::Affine2;
use smallvec::{smallvec, SmallVec};
use std::any::TypeId;
use std::time::Instant;

#[derive(Clone, Copy, Debug)]
enum Hook {
    Awake,
    Start,
    Enable,
    Disable,
    Update(f32),
    Destroy,
}

#[derive(Clone, Copy, Debug)]
enum PendingDestroy {
    Entity(Entity),
    Component(Entity),
}

/// One independent scene: entity arena, root list, component registry and the
/// queues that order lifecycle callbacks across frames.
pub struct SceneWorld {
    pub(crate) world: World,
    roots: Vec<Entity>,
    registry: ComponentRegistry,
    pending_start: Vec<Entity>,
    pending_destroy: Vec<PendingDestroy>,
    assets: Box<dyn AssetTracker>,
    events: EventBus,
    profiler: FrameProfiler,
    frame: u64,
}

impl Default for SceneWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneWorld {
    pub fn new() -> Self {
        Self::with_asset_tracker(Box::new(PathAssetTracker::default()))
    }

    pub fn with_asset_tracker(assets: Box<dyn AssetTracker>) -> Self {
        Self {
            world: World::new(),
            roots: Vec::new(),
            registry: ComponentRegistry::new(),
            pending_start: Vec::new(),
            pending_destroy: Vec::new(),
            assets,
            events: EventBus::default(),
            profiler: FrameProfiler::new(),
            frame: 0,
        }
    }

    // ---------- Entities ----------

    pub fn spawn(&mut self, name: impl Into<String>) -> EntityId {
        let entity = self
            .world
            .spawn((
                Node::new(name),
                Transform::default(),
                WorldTransform::default(),
                Children::default(),
                Attachments::default(),
            ))
            .id();
        self.roots.push(entity);
        EntityId(entity)
    }

    pub fn spawn_child(&mut self, parent: EntityId, name: impl Into<String>) -> EntityId {
        let child = self.spawn(name);
        if !self.is_destroyed(parent) {
            self.detach(child.0);
            self.attach(child.0, Some(parent.0));
        }
        child
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.world.get::<Node>(entity.0).is_some()
    }

    /// True for soft-destroyed entities and for handles that no longer resolve.
    pub fn is_destroyed(&self, entity: EntityId) -> bool {
        self.world.get::<Node>(entity.0).map(|node| node.destroyed).unwrap_or(true)
    }

    pub fn node(&self, entity: EntityId) -> Option<&Node> {
        self.world.get::<Node>(entity.0)
    }

    fn node_mut(&mut self, entity: EntityId) -> Option<&mut Node> {
        let node = self.world.get_mut::<Node>(entity.0)?.into_inner();
        if node.destroyed {
            None
        } else {
            Some(node)
        }
    }

    pub fn id_of(&self, entity: EntityId) -> Option<ObjectId> {
        self.node(entity).map(|node| node.identity.id())
    }

    pub fn name(&self, entity: EntityId) -> Option<&str> {
        self.node(entity).map(|node| node.identity.name())
    }

    pub fn set_name(&mut self, entity: EntityId, name: impl Into<String>) -> bool {
        match self.node_mut(entity) {
            Some(node) => {
                node.identity.rename(name);
                true
            }
            None => false,
        }
    }

    pub fn tag(&self, entity: EntityId) -> Option<&str> {
        self.node(entity).map(|node| node.tag.as_str())
    }

    pub fn set_tag(&mut self, entity: EntityId, tag: impl Into<String>) -> bool {
        match self.node_mut(entity) {
            Some(node) => {
                node.tag = tag.into();
                true
            }
            None => false,
        }
    }

    pub fn layer(&self, entity: EntityId) -> Option<i32> {
        self.node(entity).map(|node| node.layer)
    }

    pub fn set_layer(&mut self, entity: EntityId, layer: i32) -> bool {
        match self.node_mut(entity) {
            Some(node) => {
                node.layer = layer;
                true
            }
            None => false,
        }
    }

    pub fn is_persistent(&self, entity: EntityId) -> bool {
        self.node(entity).map(|node| node.persistent).unwrap_or(false)
    }

    pub fn set_persistent(&mut self, entity: EntityId, persistent: bool) -> bool {
        match self.node_mut(entity) {
            Some(node) => {
                node.persistent = persistent;
                true
            }
            None => false,
        }
    }

    pub fn roots(&self) -> Vec<EntityId> {
        self.roots.iter().copied().map(EntityId).collect()
    }

    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.world
            .get::<Children>(entity.0)
            .map(|children| children.0.iter().copied().map(EntityId).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.world.get::<Parent>(entity.0).map(|parent| EntityId(parent.0))
    }

    /// Every entity in hierarchy pre-order, roots in root-list order.
    pub fn preorder(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<Entity> = self.roots.iter().rev().copied().collect();
        while let Some(entity) = stack.pop() {
            out.push(EntityId(entity));
            if let Some(children) = self.world.get::<Children>(entity) {
                stack.extend(children.0.iter().rev().copied());
            }
        }
        out
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.preorder().into_iter().find(|entity| !self.is_destroyed(*entity) && self.name(*entity) == Some(name))
    }

    pub fn find_with_tag(&self, tag: &str) -> Vec<EntityId> {
        self.preorder()
            .into_iter()
            .filter(|entity| !self.is_destroyed(*entity) && self.tag(*entity) == Some(tag))
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.world.iter_entities().filter(|entity| entity.contains::<Node>()).count()
    }

    // ---------- Hierarchy ----------

    fn detach(&mut self, entity: Entity) {
        match self.world.get::<Parent>(entity).map(|parent| parent.0) {
            Some(parent) => {
                if let Some(mut children) = self.world.get_mut::<Children>(parent) {
                    children.0.retain(|child| *child != entity);
                }
                self.world.entity_mut(entity).remove::<Parent>();
            }
            None => self.roots.retain(|root| *root != entity),
        }
    }

    fn attach(&mut self, entity: Entity, parent: Option<Entity>) {
        match parent {
            Some(parent) => {
                if let Some(mut children) = self.world.get_mut::<Children>(parent) {
                    children.0.push(entity);
                }
                self.world.entity_mut(entity).insert(Parent(parent));
            }
            None => self.roots.push(entity),
        }
    }

    fn is_ancestor(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut cursor = self.world.get::<Parent>(entity).map(|parent| parent.0);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.world.get::<Parent>(current).map(|parent| parent.0);
        }
        false
    }

    /// Moves `child` under `parent` (or to the world roots for `None`). The local
    /// transform is kept, so the world pose changes with the new parent.
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> Result<(), StageError> {
        if self.is_destroyed(child) {
            return Ok(());
        }
        if let Some(parent) = parent {
            if self.is_destroyed(parent) {
                return Ok(());
            }
            if parent == child || self.is_ancestor(child.0, parent.0) {
                return Err(StageError::HierarchyCycle { child, parent });
            }
        }
        let current = self.parent(child);
        if current == parent {
            return Ok(());
        }
        self.detach(child.0);
        self.attach(child.0, parent.map(|p| p.0));
        self.events.push(StageEvent::ParentChanged { entity: child, parent });
        self.sync_subtree(child.0);
        Ok(())
    }

    /// Like [`SceneWorld::set_parent`], but rewrites the local transform so the cached
    /// world pose is unchanged.
    pub fn set_parent_keep_world(&mut self, child: EntityId, parent: Option<EntityId>) -> Result<(), StageError> {
        let Some(world) = self.world_transform(child) else {
            return Ok(());
        };
        self.set_parent(child, parent)?;
        self.set_world_position(child, world.position);
        self.set_world_rotation(child, world.rotation);
        self.set_world_scale(child, world.scale);
        Ok(())
    }

    pub fn is_active(&self, entity: EntityId) -> bool {
        self.node(entity).map(|node| node.active).unwrap_or(false)
    }

    pub fn is_active_in_hierarchy(&self, entity: EntityId) -> bool {
        let mut cursor = Some(entity.0);
        while let Some(current) = cursor {
            match self.world.get::<Node>(current) {
                Some(node) if node.active => {}
                _ => return false,
            }
            cursor = self.world.get::<Parent>(current).map(|parent| parent.0);
        }
        true
    }

    /// Toggles the entity's own active flag and fires enable/disable on every
    /// component whose effective state changes, descendants included.
    pub fn set_active(&mut self, entity: EntityId, active: bool) -> bool {
        let Some(node) = self.node_mut(entity) else {
            return false;
        };
        if node.active == active {
            return true;
        }
        node.active = active;
        self.sync_subtree(entity.0);
        true
    }

    fn sync_subtree(&mut self, root: Entity) {
        let mut stack: SmallVec<[Entity; 16]> = smallvec![root];
        while let Some(entity) = stack.pop() {
            let Some(node) = self.world.get::<Node>(entity) else {
                continue;
            };
            // A deactivated descendant keeps its whole subtree inactive either way.
            if entity != root && !node.active {
                continue;
            }
            let components: SmallVec<[Entity; 8]> = self
                .world
                .get::<Attachments>(entity)
                .map(|a| a.order.iter().copied().collect())
                .unwrap_or_default();
            for component in components {
                self.sync_component(component);
            }
            if let Some(children) = self.world.get::<Children>(entity) {
                stack.extend(children.0.iter().rev().copied());
            }
        }
    }

    fn sync_component(&mut self, component: Entity) {
        let Some((owner, flags)) = self.world.get::<Attachment>(component).map(|a| (a.owner, a.flags)) else {
            return;
        };
        if flags.contains(LifecycleFlags::DESTROYED) || !flags.contains(LifecycleFlags::AWAKE) {
            return;
        }
        let want = flags.contains(LifecycleFlags::ENABLED) && self.is_active_in_hierarchy(EntityId(owner));
        if want == flags.contains(LifecycleFlags::LIVE) {
            return;
        }
        self.update_flags(component, |f| f.set(LifecycleFlags::LIVE, want));
        self.invoke(component, if want { Hook::Enable } else { Hook::Disable });
    }

    // ---------- Components ----------

    pub fn add_component<T: Behaviour>(&mut self, entity: EntityId, behaviour: T) -> Option<ComponentId> {
        self.add_component_with(entity, Box::new(behaviour), true)
    }

    /// Attaches a boxed behaviour, wakes it and, if `enabled` and the entity is active
    /// in the hierarchy, enables it. Its start runs on a later tick.
    pub fn add_component_with(
        &mut self,
        entity: EntityId,
        behaviour: Box<dyn Behaviour>,
        enabled: bool,
    ) -> Option<ComponentId> {
        if self.is_destroyed(entity) {
            return None;
        }
        let type_id = (*behaviour).as_any().type_id();
        let type_name = behaviour.type_name();
        let flags = if enabled { LifecycleFlags::ENABLED } else { LifecycleFlags::empty() };
        let component = self
            .world
            .spawn(Attachment {
                owner: entity.0,
                identity: Identity::new(type_name),
                type_id,
                type_name,
                flags,
                behaviour: Some(behaviour),
            })
            .id();
        if let Some(mut attachments) = self.world.get_mut::<Attachments>(entity.0) {
            attachments.push(type_id, component);
        }
        self.registry.register(entity.0, type_id, type_name);
        self.update_flags(component, |f| f.insert(LifecycleFlags::AWAKE | LifecycleFlags::REGISTERED));
        log::trace!("awake {type_name} on {entity}");
        self.invoke(component, Hook::Awake);
        self.pending_start.push(component);
        self.sync_component(component);
        Some(ComponentId(component))
    }

    pub fn remove_component(&mut self, component: ComponentId) -> bool {
        self.destroy_component(component)
    }

    pub fn component<T: Behaviour>(&self, id: ComponentId) -> Option<&T> {
        let attachment = self.world.get::<Attachment>(id.0)?;
        if attachment.is_destroyed() {
            return None;
        }
        downcast_ref::<T>(attachment.behaviour.as_deref()?)
    }

    pub fn component_mut<T: Behaviour>(&mut self, id: ComponentId) -> Option<&mut T> {
        let attachment = self.world.get_mut::<Attachment>(id.0)?.into_inner();
        if attachment.is_destroyed() {
            return None;
        }
        downcast_mut::<T>(attachment.behaviour.as_deref_mut()?)
    }

    /// Live components of type `T` on the entity, in attachment order.
    pub fn components_of<T: Behaviour>(&self, entity: EntityId) -> Vec<ComponentId> {
        let Some(attachments) = self.world.get::<Attachments>(entity.0) else {
            return Vec::new();
        };
        attachments
            .of_type(TypeId::of::<T>())
            .iter()
            .copied()
            .filter(|c| self.world.get::<Attachment>(*c).map(|a| !a.is_destroyed()).unwrap_or(false))
            .map(ComponentId)
            .collect()
    }

    /// First live component of type `T`. A component inside its own callback is not visible here.
    pub fn get_component<T: Behaviour>(&self, entity: EntityId) -> Option<&T> {
        let attachments = self.world.get::<Attachments>(entity.0)?;
        attachments.of_type(TypeId::of::<T>()).iter().find_map(|c| self.component::<T>(ComponentId(*c)))
    }

    pub fn get_component_mut<T: Behaviour>(&mut self, entity: EntityId) -> Option<&mut T> {
        let id = {
            let attachments = self.world.get::<Attachments>(entity.0)?;
            attachments
                .of_type(TypeId::of::<T>())
                .iter()
                .copied()
                .find(|c| self.component::<T>(ComponentId(*c)).is_some())?
        };
        self.component_mut::<T>(ComponentId(id))
    }

    pub fn has_component<T: Behaviour>(&self, entity: EntityId) -> bool {
        self.registry.contains(entity.0, TypeId::of::<T>())
    }

    pub fn component_ids(&self, entity: EntityId) -> Vec<ComponentId> {
        self.world
            .get::<Attachments>(entity.0)
            .map(|a| a.order.iter().copied().map(ComponentId).collect())
            .unwrap_or_default()
    }

    pub fn component_owner(&self, id: ComponentId) -> Option<EntityId> {
        self.world.get::<Attachment>(id.0).map(|a| EntityId(a.owner))
    }

    pub fn component_type_name(&self, id: ComponentId) -> Option<&'static str> {
        self.world.get::<Attachment>(id.0).map(|a| a.type_name)
    }

    pub fn component_flags(&self, id: ComponentId) -> Option<LifecycleFlags> {
        self.world.get::<Attachment>(id.0).map(|a| a.flags)
    }

    pub fn is_component_enabled(&self, id: ComponentId) -> bool {
        self.component_flags(id).map(|f| f.contains(LifecycleFlags::ENABLED)).unwrap_or(false)
    }

    /// Borrow the component as a trait object, e.g. for serialization.
    pub fn behaviour(&self, id: ComponentId) -> Option<&dyn Behaviour> {
        self.world.get::<Attachment>(id.0)?.behaviour.as_deref()
    }

    pub fn set_component_enabled(&mut self, id: ComponentId, enabled: bool) -> bool {
        let Some(mut attachment) = self.world.get_mut::<Attachment>(id.0) else {
            return false;
        };
        if attachment.is_destroyed() {
            return false;
        }
        attachment.flags.set(LifecycleFlags::ENABLED, enabled);
        self.sync_component(id.0);
        true
    }

    fn update_flags(&mut self, component: Entity, f: impl FnOnce(&mut LifecycleFlags)) {
        if let Some(mut attachment) = self.world.get_mut::<Attachment>(component) {
            f(&mut attachment.flags);
        }
    }

    fn invoke(&mut self, component: Entity, hook: Hook) {
        let (owner, mut behaviour) = {
            let Some(mut attachment) = self.world.get_mut::<Attachment>(component) else {
                return;
            };
            // Already checked out by an outer callback of the same component.
            let Some(behaviour) = attachment.behaviour.take() else {
                return;
            };
            (attachment.owner, behaviour)
        };
        {
            let mut ctx = BehaviourCtx { world: &mut *self, entity: EntityId(owner), component: ComponentId(component) };
            match hook {
                Hook::Awake => behaviour.on_awake(&mut ctx),
                Hook::Start => behaviour.on_start(&mut ctx),
                Hook::Enable => behaviour.on_enable(&mut ctx),
                Hook::Disable => behaviour.on_disable(&mut ctx),
                Hook::Update(dt) => behaviour.on_update(&mut ctx, dt),
                Hook::Destroy => behaviour.on_destroy(&mut ctx),
            }
        }
        if let Some(mut attachment) = self.world.get_mut::<Attachment>(component) {
            attachment.behaviour = Some(behaviour);
        }
    }

    // ---------- Destruction ----------

    /// Marks the entity destroyed and queues it for teardown after the current frame.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        let Some(node) = self.node_mut(entity) else {
            return false;
        };
        node.destroyed = true;
        self.pending_destroy.push(PendingDestroy::Entity(entity.0));
        true
    }

    /// Marks the component destroyed and unregisters it; teardown follows after the frame.
    pub fn destroy_component(&mut self, id: ComponentId) -> bool {
        let Some(mut attachment) = self.world.get_mut::<Attachment>(id.0) else {
            return false;
        };
        if attachment.is_destroyed() {
            return false;
        }
        let registered = attachment.flags.contains(LifecycleFlags::REGISTERED);
        attachment.flags.insert(LifecycleFlags::DESTROYED);
        attachment.flags.remove(LifecycleFlags::REGISTERED);
        let (owner, type_id) = (attachment.owner, attachment.type_id);
        if registered {
            self.registry.unregister(owner, type_id);
        }
        self.pending_destroy.push(PendingDestroy::Component(id.0));
        true
    }

    /// Tears the entity down now: children first (bottom-up), then its components in
    /// reverse attachment order, then the entity itself.
    ///
    /// Called from inside a hook of a component in the subtree, this falls back to
    /// [`destroy`](Self::destroy) so that component still gets its `on_disable`/`on_destroy`.
    pub fn destroy_immediate(&mut self, entity: EntityId) -> bool {
        if self.subtree_has_running_hook(entity.0) {
            log::debug!("entity {:?} is inside its own hook; destroy deferred to the sweep", entity.0);
            return self.destroy(entity);
        }
        self.destroy_now(entity)
    }

    fn subtree_has_running_hook(&self, root: Entity) -> bool {
        let mut stack: SmallVec<[Entity; 16]> = smallvec![root];
        while let Some(entity) = stack.pop() {
            let checked_out = self.world.get::<Attachments>(entity).is_some_and(|attachments| {
                attachments
                    .order
                    .iter()
                    .any(|c| self.world.get::<Attachment>(*c).is_some_and(|a| a.behaviour.is_none()))
            });
            if checked_out {
                return true;
            }
            if let Some(children) = self.world.get::<Children>(entity) {
                stack.extend(children.0.iter().copied());
            }
        }
        false
    }

    fn destroy_now(&mut self, entity: EntityId) -> bool {
        let Some(mut node) = self.world.get_mut::<Node>(entity.0) else {
            return false;
        };
        node.destroyed = true;
        let name = node.identity.name().to_string();

        let children = self.world.get::<Children>(entity.0).map(|c| c.0.clone()).unwrap_or_default();
        for child in children {
            self.destroy_now(EntityId(child));
        }
        let components = self.world.get::<Attachments>(entity.0).map(|a| a.order.clone()).unwrap_or_default();
        for component in components.into_iter().rev() {
            self.teardown_component(component);
        }

        self.detach(entity.0);
        self.registry.forget_entity(entity.0);
        self.world.despawn(entity.0);
        log::debug!("destroyed entity '{name}'");
        self.events.push(StageEvent::EntityDestroyed { entity, name });
        true
    }

    /// Same deferral rule as [`destroy_immediate`](Self::destroy_immediate) when the
    /// component is running one of its own hooks.
    pub fn destroy_component_immediate(&mut self, id: ComponentId) -> bool {
        if self.world.get::<Attachment>(id.0).is_some_and(|a| a.behaviour.is_none()) {
            return self.destroy_component(id);
        }
        self.teardown_component(id.0)
    }

    fn teardown_component(&mut self, component: Entity) -> bool {
        let Some(flags) = self.world.get::<Attachment>(component).map(|a| a.flags) else {
            return false;
        };
        self.update_flags(component, |f| f.insert(LifecycleFlags::DESTROYED));
        if flags.contains(LifecycleFlags::LIVE) {
            self.update_flags(component, |f| f.remove(LifecycleFlags::LIVE));
            self.invoke(component, Hook::Disable);
        }
        self.invoke(component, Hook::Destroy);

        let Some((owner, type_id, type_name, registered)) = self
            .world
            .get::<Attachment>(component)
            .map(|a| (a.owner, a.type_id, a.type_name, a.flags.contains(LifecycleFlags::REGISTERED)))
        else {
            return false;
        };
        if registered {
            self.registry.unregister(owner, type_id);
        }
        if let Some(mut attachments) = self.world.get_mut::<Attachments>(owner) {
            attachments.remove(type_id, component);
        }
        self.world.despawn(component);
        self.events.push(StageEvent::ComponentDestroyed {
            entity: EntityId(owner),
            component: ComponentId(component),
            type_name,
        });
        true
    }

    fn flush_destroyed(&mut self) {
        while !self.pending_destroy.is_empty() {
            let batch = std::mem::take(&mut self.pending_destroy);
            for item in batch {
                match item {
                    PendingDestroy::Entity(entity) => {
                        self.destroy_immediate(EntityId(entity));
                    }
                    PendingDestroy::Component(component) => {
                        self.teardown_component(component);
                    }
                }
            }
        }
    }

    /// Soft-destroys every root not flagged persistent. Returns how many were queued.
    pub fn clear_scene(&mut self) -> usize {
        let mut queued = 0;
        for root in self.roots.clone().into_iter().map(EntityId) {
            if !self.is_persistent(root) && self.destroy(root) {
                queued += 1;
            }
        }
        queued
    }

    /// Runs the destruction sweep outside of `tick`.
    pub fn flush(&mut self) {
        self.flush_destroyed();
    }

    // ---------- Frame driver ----------

    /// One frame: pending starts, a pre-order update pass that refreshes each
    /// entity's world transform before its components run, then the destruction sweep.
    pub fn tick(&mut self, dt: f32) {
        self.frame += 1;

        let started = Instant::now();
        self.run_pending_starts();
        self.profiler.record_since("start_queue", started);

        let started = Instant::now();
        let roots = self.roots.clone();
        for root in roots {
            if self.world.get::<Parent>(root).is_none() {
                self.update_tree(root, dt);
            }
        }
        self.profiler.record_since("update", started);

        let started = Instant::now();
        self.flush_destroyed();
        self.profiler.record_since("destroy_sweep", started);
    }

    fn run_pending_starts(&mut self) {
        let queue = std::mem::take(&mut self.pending_start);
        let mut waiting = Vec::new();
        for component in queue {
            let Some(flags) = self.world.get::<Attachment>(component).map(|a| a.flags) else {
                continue;
            };
            if flags.intersects(LifecycleFlags::DESTROYED | LifecycleFlags::STARTED) {
                continue;
            }
            if !flags.contains(LifecycleFlags::LIVE) {
                waiting.push(component);
                continue;
            }
            self.update_flags(component, |f| f.insert(LifecycleFlags::STARTED));
            self.invoke(component, Hook::Start);
        }
        waiting.append(&mut self.pending_start);
        self.pending_start = waiting;
    }

    fn update_tree(&mut self, root: Entity, dt: f32) {
        let mut stack: SmallVec<[Entity; 32]> = smallvec![root];
        while let Some(entity) = stack.pop() {
            match self.world.get::<Node>(entity) {
                Some(node) if node.active && !node.destroyed => {}
                _ => continue,
            }
            let Some(local) = self.world.get::<Transform>(entity).copied() else {
                continue;
            };
            let parent_matrix = self
                .world
                .get::<Parent>(entity)
                .and_then(|parent| self.world.get::<WorldTransform>(parent.0))
                .map(|world| world.matrix)
                .unwrap_or(Affine2::IDENTITY);
            if let Some(mut world) = self.world.get_mut::<WorldTransform>(entity) {
                *world = WorldTransform::from_matrix(compose(&parent_matrix, &local));
            }

            let components: SmallVec<[Entity; 8]> = self
                .world
                .get::<Attachments>(entity)
                .map(|a| a.order.iter().copied().collect())
                .unwrap_or_default();
            for component in components {
                let runnable = self
                    .world
                    .get::<Attachment>(component)
                    .map(|a| a.flags.contains(LifecycleFlags::LIVE) && !a.is_destroyed())
                    .unwrap_or(false);
                if runnable {
                    self.invoke(component, Hook::Update(dt));
                }
            }

            if let Some(children) = self.world.get::<Children>(entity) {
                stack.extend(children.0.iter().rev().copied());
            }
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn profiler(&self) -> &FrameProfiler {
        &self.profiler
    }

    pub fn pending_start_count(&self) -> usize {
        self.pending_start.len()
    }

    // ---------- Registry queries ----------

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Non-destroyed entities that own at least one live component of every listed type.
    pub fn entities_with_components(&self, types: &[TypeId]) -> Vec<EntityId> {
        self.registry
            .entities_with_components(types)
            .into_iter()
            .map(EntityId)
            .filter(|entity| !self.is_destroyed(*entity))
            .collect()
    }

    pub fn entities_with<T: Behaviour>(&self) -> Vec<EntityId> {
        self.entities_with_components(&[TypeId::of::<T>()])
    }

    // ---------- Collaborators ----------

    pub fn resolve_drawable(&mut self, path: &str) -> Option<DrawableHandle> {
        self.assets.resolve(path)
    }

    pub fn release_drawable(&mut self, handle: DrawableHandle) {
        self.assets.release(handle);
    }

    pub fn assets(&self) -> &dyn AssetTracker {
        self.assets.as_ref()
    }

    pub fn emit(&mut self, event: StageEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<StageEvent> {
        self.events.drain()
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    /// Hosts that never drain still hold at most `capacity` events; older ones are dropped.
    pub fn set_event_capacity(&mut self, capacity: usize) {
        self.events.set_capacity(capacity);
    }
}
