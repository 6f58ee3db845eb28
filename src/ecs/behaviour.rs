use super::error::StageError;
use super::types::{ComponentId, EntityId};
use super::world::SceneWorld;
use serde_json::Value;
use std::any::Any;

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a lifecycle hook can reach: the owning world plus its own handles.
pub struct BehaviourCtx<'w> {
    pub world: &'w mut SceneWorld,
    pub entity: EntityId,
    pub component: ComponentId,
}

/// A unit of behaviour attached to an entity.
///
/// Hooks run in a fixed order over a component's life: `on_awake` once when it is
/// attached, `on_enable` whenever it becomes live, `on_start` once before its first
/// update, `on_update` every frame while live, `on_disable` whenever it stops being
/// live and `on_destroy` once during hard destruction.
pub trait Behaviour: AsAny + Send + Sync + 'static {
    /// Stable key used by scene files and the component factory.
    fn type_name(&self) -> &'static str;

    fn on_awake(&mut self, _ctx: &mut BehaviourCtx<'_>) {}
    fn on_start(&mut self, _ctx: &mut BehaviourCtx<'_>) {}
    fn on_enable(&mut self, _ctx: &mut BehaviourCtx<'_>) {}
    fn on_disable(&mut self, _ctx: &mut BehaviourCtx<'_>) {}
    fn on_update(&mut self, _ctx: &mut BehaviourCtx<'_>, _dt: f32) {}
    fn on_destroy(&mut self, _ctx: &mut BehaviourCtx<'_>) {}

    /// Serialized fields. `None` marks the component as not serializable.
    fn save(&self) -> Option<Value> {
        Some(Value::Object(Default::default()))
    }

    fn load(&mut self, _data: &Value) -> Result<(), StageError> {
        Ok(())
    }
}

type UpdateFn = Box<dyn FnMut(&mut BehaviourCtx<'_>, f32) + Send + Sync>;

/// Anonymous per-frame closure. Never written to scene files.
pub struct FnBehaviour {
    update: UpdateFn,
}

impl FnBehaviour {
    pub fn new(update: impl FnMut(&mut BehaviourCtx<'_>, f32) + Send + Sync + 'static) -> Self {
        Self { update: Box::new(update) }
    }
}

impl Behaviour for FnBehaviour {
    fn type_name(&self) -> &'static str {
        "FnBehaviour"
    }

    fn on_update(&mut self, ctx: &mut BehaviourCtx<'_>, dt: f32) {
        (self.update)(ctx, dt);
    }

    fn save(&self) -> Option<Value> {
        None
    }
}

pub(crate) fn downcast_ref<T: Behaviour>(behaviour: &dyn Behaviour) -> Option<&T> {
    behaviour.as_any().downcast_ref::<T>()
}

pub(crate) fn downcast_mut<T: Behaviour>(behaviour: &mut dyn Behaviour) -> Option<&mut T> {
    behaviour.as_any_mut().downcast_mut::<T>()
}
