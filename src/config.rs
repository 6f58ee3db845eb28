use crate::animation::{Animator, DEFAULT_MIX_DURATION};
use crate::ecs::{Behaviour, ComponentFactory};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "AnimationConfig::default_speed")]
    pub default_speed: f32,
    #[serde(default = "AnimationConfig::default_mix_duration")]
    pub default_mix_duration: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameConfig {
    #[serde(default = "FrameConfig::default_max_delta")]
    pub max_delta: f32,
    #[serde(default = "FrameConfig::default_fixed_delta")]
    pub fixed_delta: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageConfig {
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default)]
pub struct StageConfigOverrides {
    pub fixed_delta: Option<f32>,
    pub log_filter: Option<String>,
}

impl AnimationConfig {
    const fn default_speed() -> f32 {
        1.0
    }

    const fn default_mix_duration() -> f32 {
        DEFAULT_MIX_DURATION
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self { default_speed: Self::default_speed(), default_mix_duration: Self::default_mix_duration() }
    }
}

impl FrameConfig {
    const fn default_max_delta() -> f32 {
        0.1
    }

    fn default_fixed_delta() -> f32 {
        1.0 / 60.0
    }

    /// Clamps a frame delta to `[0, max_delta]`.
    pub fn clamp_delta(&self, dt: f32) -> f32 {
        if !dt.is_finite() {
            return 0.0;
        }
        dt.clamp(0.0, self.max_delta.max(0.0))
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { max_delta: Self::default_max_delta(), fixed_delta: Self::default_fixed_delta() }
    }
}

impl LogConfig {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: Self::default_filter() }
    }
}

impl StageConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &StageConfigOverrides) {
        if let Some(dt) = overrides.fixed_delta {
            self.frame.fixed_delta = dt;
        }
        if let Some(filter) = &overrides.log_filter {
            self.log.filter = filter.clone();
        }
    }

    /// Built-in component types, with animators seeded from the animation section.
    pub fn component_factory(&self) -> ComponentFactory {
        let mut factory = ComponentFactory::with_builtins();
        let animation = self.animation.clone();
        factory.unregister("Animator");
        factory.register_with("Animator", false, move || {
            let mut animator = Animator::new();
            animator.set_speed(animation.default_speed);
            animator.set_default_mix(animation.default_mix_duration);
            Ok(Box::new(animator) as Box<dyn Behaviour>)
        });
        factory
    }
}

impl StageConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.fixed_delta.is_none() && self.log_filter.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.fixed_delta.is_some() {
            fields.push("dt");
        }
        if self.log_filter.is_some() {
            fields.push("log");
        }
        fields
    }
}

/// Installs the `env_logger` backend. `RUST_LOG` wins over `filter` when set.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter);
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}
