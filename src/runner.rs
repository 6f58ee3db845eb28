//! Headless frame driver: config, logging, an optional scene file and a fixed-step loop.

use crate::cli::CliOverrides;
use crate::config::{init_logging, StageConfig};
use crate::ecs::{ComponentFactory, EntityId, SceneWorld};
use crate::events::{EventBus, StageEvent};
use crate::scene::Scene;
use anyhow::{Context, Result};
use std::path::Path;

pub const CONFIG_PATH: &str = "config/stage.json";
const DEFAULT_FRAMES: u32 = 60;

pub struct Stage {
    world: SceneWorld,
    factory: ComponentFactory,
    config: StageConfig,
    accumulator: f32,
    events: EventBus,
}

impl Stage {
    pub fn new(config: StageConfig) -> Self {
        let factory = config.component_factory();
        Self { world: SceneWorld::new(), factory, config, accumulator: 0.0, events: EventBus::default() }
    }

    pub fn world(&self) -> &SceneWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut SceneWorld {
        &mut self.world
    }

    pub fn factory_mut(&mut self) -> &mut ComponentFactory {
        &mut self.factory
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn load_scene_file(&mut self, path: &Path) -> Result<Vec<EntityId>> {
        let scene = Scene::load_from_path(path)?;
        self.world
            .load_scene(&scene, &self.factory)
            .with_context(|| format!("Instantiating scene {}", path.display()))
    }

    /// Feeds real elapsed time into the fixed-step accumulator. Returns the number of
    /// ticks that ran. A non-positive fixed step ticks once with the clamped delta.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        let dt = self.config.frame.clamp_delta(elapsed);
        let fixed = self.config.frame.fixed_delta;
        if fixed <= 0.0 {
            self.tick(dt);
            return 1;
        }
        self.accumulator += dt;
        let mut steps = 0;
        while self.accumulator >= fixed {
            self.tick(fixed);
            self.accumulator -= fixed;
            steps += 1;
        }
        steps
    }

    fn tick(&mut self, dt: f32) {
        self.world.tick(dt);
        for event in self.world.drain_events() {
            log::debug!("{event}");
            self.events.push(event);
        }
    }

    pub fn drain_events(&mut self) -> Vec<StageEvent> {
        self.events.drain()
    }
}

pub fn run() -> Result<Stage> {
    run_with_overrides(CliOverrides::parse_from_env()?)
}

/// Loads the config, applies CLI overrides, optionally loads a scene and steps the
/// requested number of fixed frames.
pub fn run_with_overrides(cli: CliOverrides) -> Result<Stage> {
    let loaded = StageConfig::load(CONFIG_PATH);
    let mut config = loaded.as_ref().map(Clone::clone).unwrap_or_default();
    let overrides = cli.config_overrides();
    config.apply_overrides(&overrides);
    init_logging(&config.log.filter);
    if let Err(err) = &loaded {
        log::info!("{err:#}; using default config");
    }
    if !overrides.is_empty() {
        log::info!("CLI overrides applied: {}", overrides.applied_fields().join(", "));
    }

    let mut stage = Stage::new(config);
    if let Some(path) = cli.scene() {
        let roots = stage.load_scene_file(path)?;
        log::info!("scene {} loaded with {} root entities", path.display(), roots.len());
    }
    let frames = cli.frames().unwrap_or(DEFAULT_FRAMES);
    let fixed = stage.config.frame.fixed_delta;
    for _ in 0..frames {
        if fixed > 0.0 {
            stage.tick(fixed);
        } else {
            stage.advance(stage.config.frame.max_delta);
        }
    }
    log::info!("ran {frames} frames; {} entities alive", stage.world.entity_count());
    Ok(stage)
}
