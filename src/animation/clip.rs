use super::curve::Curve;
use super::timeline::{ClipError, KeyValue, Keyframe, Property, Target, Timeline, SELF_TARGET};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: Arc<str>,
    pub duration: f32,
    pub looping: bool,
    pub timelines: Vec<Timeline>,
}

impl AnimationClip {
    pub fn new(name: &str, duration: f32, looping: bool, timelines: Vec<Timeline>) -> Self {
        Self { name: Arc::from(name), duration: duration.max(0.0), looping, timelines }
    }

    /// Looping clips wrap modulo the duration; others clamp to `[0, duration]`.
    pub fn wrap_time(&self, time: f32) -> f32 {
        if self.duration <= 0.0 || time.is_nan() || (self.looping && time.is_infinite()) {
            return 0.0;
        }
        if self.looping {
            time.rem_euclid(self.duration)
        } else {
            time.clamp(0.0, self.duration)
        }
    }

    pub fn find_timeline(&self, target: &Target, property: Property) -> Option<(usize, &Timeline)> {
        self.timelines
            .iter()
            .enumerate()
            .find(|(_, timeline)| timeline.property == property && &timeline.target == target)
    }

    pub fn sample(&self, target: &Target, property: Property, time: f32) -> Option<f32> {
        self.find_timeline(target, property)?.1.sample(self.wrap_time(time))
    }

    /// Interchange form: `{name, duration, looping, timelines: [{bone, prop, keys: [{t, v, c}]}]}`.
    pub fn to_value(&self) -> Value {
        let timelines: Vec<Value> = self
            .timelines
            .iter()
            .map(|timeline| {
                let keys: Vec<Value> = timeline
                    .keys()
                    .iter()
                    .map(|key| {
                        let value = match &key.value {
                            KeyValue::Scalar(v) => json!(v),
                            KeyValue::Frame(path) => json!(&**path),
                        };
                        json!({ "t": key.time, "v": value, "c": key.curve.as_str() })
                    })
                    .collect();
                json!({ "bone": timeline.target.as_str(), "prop": timeline.property.as_str(), "keys": keys })
            })
            .collect();
        json!({
            "name": &*self.name,
            "duration": self.duration,
            "looping": self.looping,
            "timelines": timelines,
        })
    }
}

/// A timeline that was dropped while parsing a clip.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipIssue {
    pub timeline: usize,
    pub message: String,
}

#[derive(Deserialize)]
struct ClipFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    duration: Option<f32>,
    #[serde(default, alias = "loop", alias = "looped")]
    looping: bool,
    #[serde(default)]
    timelines: Vec<Value>,
}

#[derive(Deserialize)]
struct TimelineFile {
    #[serde(default = "default_target", alias = "target")]
    bone: String,
    #[serde(alias = "property")]
    prop: String,
    keys: Vec<KeyFile>,
}

#[derive(Deserialize)]
struct KeyFile {
    t: f32,
    v: Value,
    #[serde(default)]
    c: Option<String>,
}

fn default_target() -> String {
    SELF_TARGET.to_string()
}

fn build_timeline(raw: Value) -> Result<Timeline, ClipError> {
    let file: TimelineFile = serde_json::from_value(raw).map_err(|err| ClipError::Malformed(err.to_string()))?;
    let property = Property::parse(&file.prop).ok_or_else(|| ClipError::UnknownProperty(file.prop.clone()))?;
    let mut keys = Vec::with_capacity(file.keys.len());
    for key in file.keys {
        let curve = match key.c.as_deref() {
            None => Curve::Linear,
            Some(tag) => Curve::parse(tag).ok_or_else(|| ClipError::UnknownCurve(tag.to_string()))?,
        };
        let value = match (&key.v, property.is_discrete()) {
            (Value::String(path), true) => KeyValue::Frame(Arc::from(path.as_str())),
            (Value::Number(n), false) => match n.as_f64() {
                Some(v) => KeyValue::Scalar(v as f32),
                None => return Err(ClipError::ValueKind(property.as_str())),
            },
            _ => return Err(ClipError::ValueKind(property.as_str())),
        };
        keys.push(Keyframe { time: key.t, value, curve });
    }
    Timeline::new(Target::parse(&file.bone), property, keys)
}

/// Parses a clip, returning the timelines that had to be skipped alongside it.
pub fn parse_clip_report(value: &Value, key_hint: &str) -> Result<(AnimationClip, Vec<ClipIssue>)> {
    let file: ClipFile =
        serde_json::from_value(value.clone()).context("Clip JSON does not match the clip layout")?;
    let mut issues = Vec::new();
    let mut timelines = Vec::with_capacity(file.timelines.len());
    for (index, raw) in file.timelines.into_iter().enumerate() {
        match build_timeline(raw) {
            Ok(timeline) => timelines.push(timeline),
            Err(err) => issues.push(ClipIssue { timeline: index, message: err.to_string() }),
        }
    }
    let last_key = timelines.iter().map(Timeline::end_time).fold(0.0_f32, f32::max);
    let duration = match file.duration {
        Some(duration) if duration.is_finite() && duration >= 0.0 => duration,
        Some(duration) => {
            issues.push(ClipIssue {
                timeline: usize::MAX,
                message: format!("invalid duration {duration}; using last key time {last_key}"),
            });
            last_key
        }
        None => last_key,
    };
    let name = file.name.unwrap_or_else(|| key_hint.to_string());
    Ok((AnimationClip::new(&name, duration, file.looping, timelines), issues))
}

/// Parses a clip, logging and skipping timelines that cannot be used.
pub fn parse_clip_value(value: &Value, key_hint: &str) -> Result<AnimationClip> {
    let (clip, issues) = parse_clip_report(value, key_hint)?;
    for issue in issues {
        if issue.timeline == usize::MAX {
            log::warn!("clip '{}': {}", clip.name, issue.message);
        } else {
            log::warn!("clip '{}': skipped timeline {}: {}", clip.name, issue.timeline, issue.message);
        }
    }
    Ok(clip)
}

pub fn parse_clip_bytes(bytes: &[u8], key_hint: &str, source_label: &str) -> Result<AnimationClip> {
    let value: Value =
        serde_json::from_slice(bytes).with_context(|| format!("Failed to parse clip JSON {source_label}"))?;
    parse_clip_value(&value, key_hint).with_context(|| format!("Invalid clip {source_label}"))
}
