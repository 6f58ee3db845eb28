use crate::config::StageConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOverrides {
    scene: Option<PathBuf>,
    frames: Option<u32>,
    dt: Option<f32>,
    log: Option<String>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --scene/--frames/--dt/--log with values.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "scene" => overrides.scene = Some(PathBuf::from(value)),
                "frames" => {
                    overrides.frames =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "dt" => {
                    let dt = value.parse::<f32>().with_context(|| format!("Invalid dt '{value}'"))?;
                    if !dt.is_finite() || dt < 0.0 {
                        bail!("Invalid dt '{value}'. Use a non-negative number of seconds.");
                    }
                    overrides.dt = Some(dt);
                }
                "log" => overrides.log = Some(value),
                _ => bail!("Unknown flag '{flag}'. Supported flags: --scene, --frames, --dt, --log."),
            }
        }
        Ok(overrides)
    }

    pub fn scene(&self) -> Option<&PathBuf> {
        self.scene.as_ref()
    }

    pub fn frames(&self) -> Option<u32> {
        self.frames
    }

    pub fn config_overrides(&self) -> StageConfigOverrides {
        StageConfigOverrides { fixed_delta: self.dt, log_filter: self.log.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_frames_dt_and_log() {
        let args = ["stage", "--scene", "fixtures/scenes/rig.json", "--frames", "30", "--dt", "0.02", "--log", "debug"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.scene(), Some(&PathBuf::from("fixtures/scenes/rig.json")));
        assert_eq!(overrides.frames(), Some(30));
        let config = overrides.config_overrides();
        assert_eq!(config.fixed_delta, Some(0.02));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn latest_flag_wins() {
        let overrides = CliOverrides::parse(["stage", "--frames", "5", "--frames", "9"]).expect("parse overrides");
        assert_eq!(overrides.frames(), Some(9));
        assert!(overrides.config_overrides().is_empty());
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["stage", "--frames"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_negative_dt() {
        let err = CliOverrides::parse(["stage", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        assert!(CliOverrides::parse(["stage", "--dt", "-1"]).is_err());
    }
}
