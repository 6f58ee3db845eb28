use crate::ecs::{ComponentFactory, EntityId, LifecycleFlags, SceneWorld, StageError, Transform};
use anyhow::{Context, Result};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub const SCENE_VERSION: u32 = 1;
pub const TRANSFORM_TYPE: &str = "Transform";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<SceneEntity>,
}

impl Default for Scene {
    fn default() -> Self {
        Self { version: SCENE_VERSION, entities: Vec::new() }
    }
}

const fn default_version() -> u32 {
    SCENE_VERSION
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(default)]
    pub layer: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub components: Vec<SceneComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneEntity>,
}

impl SceneEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: String::new(),
            layer: 0,
            active: true,
            components: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn component(&self, kind: &str) -> Option<&SceneComponent> {
        self.components.iter().find(|component| component.kind == kind)
    }
}

/// One component record: its type name, enabled flag and the fields it saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneComponent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2Data {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for Vec2Data {
    fn from(value: Vec2) -> Self {
        Self { x: value.x, y: value.y }
    }
}

impl From<Vec2Data> for Vec2 {
    fn from(value: Vec2Data) -> Self {
        Vec2::new(value.x, value.y)
    }
}

/// Scale as written by older scenes (a single number) or as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleData {
    Uniform(f32),
    Vector(Vec2Data),
    Pair([f32; 2]),
}

impl Default for ScaleData {
    fn default() -> Self {
        ScaleData::Vector(Vec2Data { x: 1.0, y: 1.0 })
    }
}

impl From<ScaleData> for Vec2 {
    fn from(value: ScaleData) -> Self {
        match value {
            ScaleData::Uniform(s) => Vec2::splat(s),
            ScaleData::Vector(v) => v.into(),
            ScaleData::Pair([x, y]) => Vec2::new(x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TransformData {
    #[serde(default)]
    pub position: Vec2Data,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub scale: ScaleData,
}

impl From<Transform> for TransformData {
    fn from(value: Transform) -> Self {
        Self {
            position: value.translation.into(),
            rotation: value.rotation,
            scale: ScaleData::Vector(value.scale.into()),
        }
    }
}

impl From<TransformData> for Transform {
    fn from(value: TransformData) -> Self {
        Transform { translation: value.position.into(), rotation: value.rotation, scale: value.scale.into() }
    }
}

impl Scene {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Parsing scene JSON")
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serializing scene")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading scene file {}", path.display()))?;
        serde_json::from_slice::<Scene>(&bytes).with_context(|| format!("Parsing scene file {}", path.display()))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating scene directory {}", parent.display()))?;
        }
        let json = self.to_json_string()?;
        fs::write(path, json.as_bytes()).with_context(|| format!("Writing scene file {}", path.display()))?;
        Ok(())
    }

    /// Number of entities including nested children.
    pub fn entity_count(&self) -> usize {
        fn count(entities: &[SceneEntity]) -> usize {
            entities.iter().map(|entity| 1 + count(&entity.children)).sum()
        }
        count(&self.entities)
    }
}

impl SceneWorld {
    /// Root entities in order, skipping persistent and destroyed ones.
    pub fn export_scene(&self) -> Scene {
        let entities = self.roots().into_iter().filter_map(|root| self.export_entity(root)).collect();
        Scene { version: SCENE_VERSION, entities }
    }

    /// Serializes one entity and its subtree. `None` for persistent or destroyed entities.
    pub fn export_entity(&self, entity: EntityId) -> Option<SceneEntity> {
        if self.is_destroyed(entity) || self.is_persistent(entity) {
            return None;
        }
        let node = self.node(entity)?;
        let mut out = SceneEntity::new(node.identity.name());
        out.tag = node.tag.clone();
        out.layer = node.layer;
        out.active = node.active;

        if let Some(transform) = self.transform(entity) {
            if let Ok(Value::Object(data)) = serde_json::to_value(TransformData::from(transform)) {
                out.components.push(SceneComponent { kind: TRANSFORM_TYPE.to_string(), enabled: true, data });
            }
        }
        for id in self.component_ids(entity) {
            let flags = self.component_flags(id).unwrap_or_default();
            if flags.contains(LifecycleFlags::DESTROYED) {
                continue;
            }
            let Some(behaviour) = self.behaviour(id) else {
                continue;
            };
            let type_name = behaviour.type_name();
            match behaviour.save() {
                Some(Value::Object(data)) => out.components.push(SceneComponent {
                    kind: type_name.to_string(),
                    enabled: flags.contains(LifecycleFlags::ENABLED),
                    data,
                }),
                Some(_) => log::warn!("scene export: {type_name} on '{}' saved a non-object; skipped", out.name),
                None => log::warn!("scene export: anonymous {type_name} on '{}' cannot be saved; skipped", out.name),
            }
        }
        out.children = self.children(entity).into_iter().filter_map(|child| self.export_entity(child)).collect();
        Some(out)
    }

    /// Adds the scene's entities next to whatever is already loaded and returns the new
    /// roots. Unknown component types and unreadable component data are skipped with a
    /// warning; a component constructor failing aborts the load and removes what it spawned.
    pub fn load_scene(&mut self, scene: &Scene, factory: &ComponentFactory) -> Result<Vec<EntityId>> {
        if scene.version > SCENE_VERSION {
            log::warn!("scene version {} is newer than supported {SCENE_VERSION}", scene.version);
        }
        let mut roots = Vec::with_capacity(scene.entities.len());
        for entity in &scene.entities {
            match self.load_entity(entity, None, factory) {
                Ok(root) => roots.push(root),
                Err(err) => {
                    for root in roots {
                        self.destroy_immediate(root);
                    }
                    return Err(err);
                }
            }
        }
        log::info!("loaded scene with {} entities", scene.entity_count());
        Ok(roots)
    }

    /// Soft-destroys the non-persistent scene, sweeps it, then loads `scene`.
    pub fn replace_scene(&mut self, scene: &Scene, factory: &ComponentFactory) -> Result<Vec<EntityId>> {
        self.clear_scene();
        self.flush();
        self.load_scene(scene, factory)
    }

    fn load_entity(
        &mut self,
        data: &SceneEntity,
        parent: Option<EntityId>,
        factory: &ComponentFactory,
    ) -> Result<EntityId> {
        let entity = match parent {
            Some(parent) => self.spawn_child(parent, data.name.clone()),
            None => self.spawn(data.name.clone()),
        };
        self.set_tag(entity, data.tag.clone());
        self.set_layer(entity, data.layer);
        self.set_active(entity, data.active);

        let result = self.load_components(entity, data, factory).and_then(|()| {
            for child in &data.children {
                self.load_entity(child, Some(entity), factory)?;
            }
            Ok(())
        });
        if let Err(err) = result {
            self.destroy_immediate(entity);
            return Err(err);
        }
        Ok(entity)
    }

    fn load_components(&mut self, entity: EntityId, data: &SceneEntity, factory: &ComponentFactory) -> Result<()> {
        for component in &data.components {
            let fields = Value::Object(component.data.clone());
            if component.kind == TRANSFORM_TYPE {
                match serde_json::from_value::<TransformData>(fields) {
                    Ok(transform) => {
                        self.set_transform(entity, transform.into());
                        self.refresh_world_transform(entity);
                    }
                    Err(err) => log::warn!("scene load: bad Transform on '{}': {err}", data.name),
                }
                continue;
            }
            let mut behaviour = match factory.construct(&component.kind) {
                Ok(behaviour) => behaviour,
                Err(err @ StageError::UnknownComponentType(_)) => {
                    log::warn!("scene load: {err} on '{}'; skipped", data.name);
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Loading entity '{}'", data.name));
                }
            };
            if let Err(err) = behaviour.load(&fields) {
                log::warn!("scene load: {err} on '{}'; skipped", data.name);
                continue;
            }
            self.add_component_with(entity, behaviour, component.enabled);
        }
        Ok(())
    }
}
