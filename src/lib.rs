pub mod animation;
pub mod animation_validation;
pub mod assets;
pub mod cli;
pub mod config;
pub mod ecs;
pub mod events;
pub mod identity;
pub mod render_queue;
pub mod runner;
pub mod scene;
pub mod skeleton;
pub mod sprite;

pub use ecs::{ComponentFactory, ComponentId, EntityId, SceneWorld, StageError};
pub use runner::{run, run_with_overrides};
