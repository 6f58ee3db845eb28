use crate::animation::{parse_clip_report, AnimationClip, ClipIssue};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationValidationSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for AnimationValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnimationValidationSeverity::Info => write!(f, "info"),
            AnimationValidationSeverity::Warning => write!(f, "warning"),
            AnimationValidationSeverity::Error => write!(f, "error"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimationValidationEvent {
    pub severity: AnimationValidationSeverity,
    pub path: PathBuf,
    pub message: String,
}

pub struct AnimationValidator;

impl AnimationValidator {
    /// Validate the clip file at `path` and return any validation events.
    pub fn validate_path(path: &Path) -> Vec<AnimationValidationEvent> {
        if !path.exists() {
            return vec![Self::event(
                path,
                AnimationValidationSeverity::Warning,
                "File not found (it may have been removed).",
            )];
        }
        let ext = path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.to_ascii_lowercase());
        if !matches!(ext.as_deref(), Some("json") | Some("clip")) {
            return vec![Self::event(
                path,
                AnimationValidationSeverity::Info,
                "No validators available for this file type.",
            )];
        }
        match fs::read(path) {
            Ok(bytes) => Self::validate_bytes(path, &bytes),
            Err(err) => vec![Self::event(
                path,
                AnimationValidationSeverity::Error,
                format!("Failed to read clip: {err}"),
            )],
        }
    }

    /// Validate clip JSON already in memory; `path` labels the events and names the clip
    /// when the JSON has no `name`.
    pub fn validate_bytes(path: &Path, bytes: &[u8]) -> Vec<AnimationValidationEvent> {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(err) => {
                return vec![Self::event(
                    path,
                    AnimationValidationSeverity::Error,
                    format!("Failed to parse JSON: {err}"),
                )];
            }
        };
        let key_hint = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("animation_clip");
        match parse_clip_report(&value, key_hint) {
            Ok((clip, issues)) => Self::clip_events(path, &clip, &issues),
            Err(err) => vec![Self::event(path, AnimationValidationSeverity::Error, format!("{err:#}"))],
        }
    }

    fn clip_events(path: &Path, clip: &AnimationClip, issues: &[ClipIssue]) -> Vec<AnimationValidationEvent> {
        let mut events: Vec<AnimationValidationEvent> = issues
            .iter()
            .map(|issue| {
                let message = if issue.timeline == usize::MAX {
                    issue.message.clone()
                } else {
                    format!("Timeline {} skipped: {}", issue.timeline, issue.message)
                };
                Self::event(path, AnimationValidationSeverity::Warning, message)
            })
            .collect();
        if clip.timelines.is_empty() {
            events.push(Self::event(
                path,
                AnimationValidationSeverity::Warning,
                format!("Clip '{}' does not define any usable timelines.", clip.name),
            ));
        }
        if clip.duration <= 0.0 {
            events.push(Self::event(
                path,
                AnimationValidationSeverity::Warning,
                "Clip duration is zero; ensure at least one keyframe has time > 0.",
            ));
        }
        for timeline in &clip.timelines {
            let end = timeline.end_time();
            if clip.duration > 0.0 && end > clip.duration {
                events.push(Self::event(
                    path,
                    AnimationValidationSeverity::Warning,
                    format!(
                        "Timeline {}.{} has keys at {end:.3}s, past the clip duration {:.3}s.",
                        timeline.target.as_str(),
                        timeline.property.as_str(),
                        clip.duration
                    ),
                ));
            }
        }
        events.push(Self::event(
            path,
            AnimationValidationSeverity::Info,
            format!(
                "Clip '{}' OK: duration {:.3}s, {}, timelines {}",
                clip.name,
                clip.duration,
                if clip.looping { "looping" } else { "one-shot" },
                Self::timeline_summary(clip)
            ),
        ));
        events
    }

    fn timeline_summary(clip: &AnimationClip) -> String {
        if clip.timelines.is_empty() {
            return "none authored".to_string();
        }
        clip.timelines
            .iter()
            .map(|timeline| {
                format!(
                    "{}.{} ({} keys)",
                    timeline.target.as_str(),
                    timeline.property.as_str(),
                    timeline.keys().len()
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn event(path: &Path, severity: AnimationValidationSeverity, message: impl Into<String>) -> AnimationValidationEvent {
        AnimationValidationEvent { severity, path: path.to_path_buf(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_display_formats() {
        assert_eq!(AnimationValidationSeverity::Info.to_string(), "info");
        assert_eq!(AnimationValidationSeverity::Warning.to_string(), "warning");
        assert_eq!(AnimationValidationSeverity::Error.to_string(), "error");
    }

    #[test]
    fn validator_reports_missing_file() {
        let events = AnimationValidator::validate_path(Path::new("foo/bar.clip"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, AnimationValidationSeverity::Warning);
        assert!(events[0].message.contains("not found"));
    }

    #[test]
    fn validator_succeeds_on_fixture_clip() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/animation_clips/arm_wave.json");
        let events = AnimationValidator::validate_path(&path);
        assert!(events.iter().any(|event| event.severity == AnimationValidationSeverity::Info));
        assert!(events.iter().all(|event| event.severity != AnimationValidationSeverity::Error));
    }

    #[test]
    fn keys_past_duration_and_bad_timelines_warn() {
        let json = br#"{
            "name": "short",
            "duration": 0.5,
            "timelines": [
                { "bone": "arm", "prop": "x", "keys": [ {"t": 0.0, "v": 0.0}, {"t": 1.0, "v": 2.0} ] },
                { "bone": "arm", "prop": "x", "keys": [] }
            ]
        }"#;
        let events = AnimationValidator::validate_bytes(Path::new("short.json"), json);
        let warnings: Vec<&str> = events
            .iter()
            .filter(|event| event.severity == AnimationValidationSeverity::Warning)
            .map(|event| event.message.as_str())
            .collect();
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings.iter().any(|message| message.contains("Timeline 1 skipped")));
        assert!(warnings.iter().any(|message| message.contains("past the clip duration")));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let events = AnimationValidator::validate_bytes(Path::new("broken.json"), b"{ nope");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, AnimationValidationSeverity::Error);
    }
}
