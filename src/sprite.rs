use crate::assets::DrawableHandle;
use crate::ecs::{Behaviour, BehaviourCtx, StageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single-image display surface for entities without a skeleton.
#[derive(Clone, Debug, PartialEq)]
pub struct Sprite {
    path: String,
    frame: Option<DrawableHandle>,
    pub color: [f32; 4],
    pub flip_x: bool,
}

impl Default for Sprite {
    fn default() -> Self {
        Self { path: String::new(), frame: None, color: [1.0; 4], flip_x: false }
    }
}

impl Sprite {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn frame(&self) -> Option<DrawableHandle> {
        self.frame
    }

    /// Swaps the displayed image. Returns the handle that was replaced.
    pub fn set_frame(&mut self, path: &str, handle: Option<DrawableHandle>) -> Option<DrawableHandle> {
        self.path = path.to_string();
        std::mem::replace(&mut self.frame, handle)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpriteData {
    #[serde(default)]
    path: String,
    #[serde(default = "white")]
    color: [f32; 4],
    #[serde(default)]
    flip_x: bool,
}

const fn white() -> [f32; 4] {
    [1.0; 4]
}

impl Behaviour for Sprite {
    fn type_name(&self) -> &'static str {
        "Sprite"
    }

    fn on_awake(&mut self, ctx: &mut BehaviourCtx<'_>) {
        if self.frame.is_none() && !self.path.is_empty() {
            self.frame = ctx.world.resolve_drawable(&self.path);
        }
    }

    fn on_destroy(&mut self, ctx: &mut BehaviourCtx<'_>) {
        if let Some(handle) = self.frame.take() {
            ctx.world.release_drawable(handle);
        }
    }

    fn save(&self) -> Option<Value> {
        serde_json::to_value(SpriteData { path: self.path.clone(), color: self.color, flip_x: self.flip_x }).ok()
    }

    fn load(&mut self, data: &Value) -> Result<(), StageError> {
        let parsed: SpriteData =
            serde_json::from_value(data.clone()).map_err(|err| StageError::invalid_data("Sprite", err))?;
        self.path = parsed.path;
        self.color = parsed.color;
        self.flip_x = parsed.flip_x;
        self.frame = None;
        Ok(())
    }
}
