//! Entity/component core: the world arena, lifecycle driver, registry and
//! transform hierarchy.

mod behaviour;
mod error;
mod factory;
pub mod profiler;
mod registry;
mod transform;
mod types;
mod world;

pub use behaviour::{AsAny, Behaviour, BehaviourCtx, FnBehaviour};
pub use error::StageError;
pub use factory::ComponentFactory;
pub use profiler::{FrameProfiler, PassTimingSummary};
pub use registry::{ComponentRegistry, TypeMask};
pub use transform::{compose, decompose};
pub use types::{
    Attachment, Attachments, Children, ComponentId, EntityId, LifecycleFlags, Node, Parent, Transform,
    WorldTransform,
};
pub use world::SceneWorld;
