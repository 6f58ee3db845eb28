use super::curve::Curve;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ClipError {
    #[error("timeline is malformed: {0}")]
    Malformed(String),
    #[error("unknown property '{0}'")]
    UnknownProperty(String),
    #[error("unknown curve '{0}'")]
    UnknownCurve(String),
    #[error("timeline has no keyframes")]
    Empty,
    #[error("keyframe time must be finite")]
    NonFiniteTime,
    #[error("keyframe time cannot be negative")]
    NegativeTime,
    #[error("keyframe value for '{0}' has the wrong type")]
    ValueKind(&'static str),
}

/// Animated channel of a bone or of the owning entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    X,
    Y,
    Rotation,
    ScaleX,
    ScaleY,
    /// Discrete display frame; never interpolated.
    Frame,
}

impl Property {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Property::X),
            "y" => Some(Property::Y),
            "rotation" | "rot" => Some(Property::Rotation),
            "scaleX" | "scale_x" => Some(Property::ScaleX),
            "scaleY" | "scale_y" => Some(Property::ScaleY),
            "frame" => Some(Property::Frame),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Property::X => "x",
            Property::Y => "y",
            Property::Rotation => "rotation",
            Property::ScaleX => "scaleX",
            Property::ScaleY => "scaleY",
            Property::Frame => "frame",
        }
    }

    pub fn is_discrete(self) -> bool {
        matches!(self, Property::Frame)
    }
}

pub const SELF_TARGET: &str = "self";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    SelfEntity,
    Bone(Arc<str>),
}

impl Target {
    pub fn parse(name: &str) -> Self {
        if name == SELF_TARGET {
            Target::SelfEntity
        } else {
            Target::Bone(Arc::from(name))
        }
    }

    pub fn bone(name: &str) -> Self {
        Target::Bone(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::SelfEntity => SELF_TARGET,
            Target::Bone(name) => &**name,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum KeyValue {
    Scalar(f32),
    Frame(Arc<str>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: KeyValue,
    /// Easing used on the way into this key from the previous one.
    pub curve: Curve,
}

impl Keyframe {
    pub fn scalar(time: f32, value: f32, curve: Curve) -> Self {
        Self { time, value: KeyValue::Scalar(value), curve }
    }

    pub fn frame(time: f32, path: &str) -> Self {
        Self { time, value: KeyValue::Frame(Arc::from(path)), curve: Curve::Step }
    }

    fn scalar_value(&self) -> f32 {
        match self.value {
            KeyValue::Scalar(v) => v,
            KeyValue::Frame(_) => 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Timeline {
    pub target: Target,
    pub property: Property,
    keys: Arc<[Keyframe]>,
}

impl Timeline {
    /// Validates the keys and sorts them by time, keeping authoring order among equal times.
    pub fn new(target: Target, property: Property, keys: Vec<Keyframe>) -> Result<Self, ClipError> {
        if keys.is_empty() {
            return Err(ClipError::Empty);
        }
        let mut indexed: Vec<(usize, Keyframe)> = Vec::with_capacity(keys.len());
        for (index, key) in keys.into_iter().enumerate() {
            if !key.time.is_finite() {
                return Err(ClipError::NonFiniteTime);
            }
            if key.time < 0.0 {
                return Err(ClipError::NegativeTime);
            }
            let kind_ok = match &key.value {
                KeyValue::Scalar(v) => !property.is_discrete() && v.is_finite(),
                KeyValue::Frame(_) => property.is_discrete(),
            };
            if !kind_ok {
                return Err(ClipError::ValueKind(property.as_str()));
            }
            indexed.push((index, key));
        }
        indexed.sort_by(|a, b| match a.1.time.partial_cmp(&b.1.time).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.0.cmp(&b.0),
            order => order,
        });
        let sorted: Vec<Keyframe> = indexed.into_iter().map(|(_, key)| key).collect();
        Ok(Self { target, property, keys: Arc::from(sorted.into_boxed_slice()) })
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    pub fn end_time(&self) -> f32 {
        self.keys.last().map(|key| key.time).unwrap_or(0.0)
    }

    /// Continuous value at `time`. Clamps outside the key range; between two keys the
    /// later key's curve shapes the blend. `None` for the discrete frame channel.
    pub fn sample(&self, time: f32) -> Option<f32> {
        if self.property.is_discrete() {
            return None;
        }
        let keys = &self.keys;
        let first = keys.first()?;
        let last = keys.last()?;
        if !time.is_finite() || time <= first.time {
            return Some(first.scalar_value());
        }
        if time >= last.time {
            return Some(last.scalar_value());
        }
        let next = keys.partition_point(|key| key.time <= time).max(1);
        let (a, b) = (&keys[next - 1], &keys[next]);
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return Some(b.scalar_value());
        }
        let alpha = b.curve.apply((time - a.time) / span);
        let (va, vb) = (a.scalar_value(), b.scalar_value());
        Some(va + (vb - va) * alpha)
    }

    /// Frame of the latest key at or before `time` (the first key before the range).
    pub fn sample_frame(&self, time: f32) -> Option<&str> {
        if !self.property.is_discrete() {
            return None;
        }
        let index = if time.is_finite() {
            self.keys.partition_point(|key| key.time <= time).saturating_sub(1)
        } else {
            0
        };
        match &self.keys.get(index)?.value {
            KeyValue::Frame(path) => Some(&**path),
            KeyValue::Scalar(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn x_timeline(keys: Vec<Keyframe>) -> Timeline {
        Timeline::new(Target::bone("arm"), Property::X, keys).expect("timeline")
    }

    #[test]
    fn clamps_outside_key_range() {
        let timeline = x_timeline(vec![
            Keyframe::scalar(0.5, 2.0, Curve::Linear),
            Keyframe::scalar(1.5, 4.0, Curve::Linear),
        ]);
        assert_eq!(timeline.sample(0.0), Some(2.0));
        assert_eq!(timeline.sample(9.0), Some(4.0));
        assert_abs_diff_eq!(timeline.sample(1.0).unwrap(), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn later_key_curve_controls_segment() {
        let timeline = x_timeline(vec![
            Keyframe::scalar(0.0, 0.0, Curve::Step),
            Keyframe::scalar(1.0, 10.0, Curve::EaseIn),
            Keyframe::scalar(2.0, 20.0, Curve::Step),
        ]);
        assert_abs_diff_eq!(timeline.sample(0.5).unwrap(), 2.5, epsilon = 1e-5);
        assert_eq!(timeline.sample(1.9), Some(10.0));
        assert_eq!(timeline.sample(2.0), Some(20.0));
    }

    #[test]
    fn unsorted_keys_are_ordered_stably() {
        let timeline = x_timeline(vec![
            Keyframe::scalar(1.0, 1.0, Curve::Linear),
            Keyframe::scalar(0.0, 0.0, Curve::Linear),
            Keyframe::scalar(1.0, 5.0, Curve::Linear),
        ]);
        let times: Vec<f32> = timeline.keys().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 1.0]);
        assert_eq!(timeline.keys()[1].value, KeyValue::Scalar(1.0));
        assert_eq!(timeline.sample(1.0), Some(5.0));
    }

    #[test]
    fn frame_channel_is_a_step_function() {
        let timeline = Timeline::new(
            Target::SelfEntity,
            Property::Frame,
            vec![Keyframe::frame(0.2, "walk_0"), Keyframe::frame(0.6, "walk_1")],
        )
        .expect("frame timeline");
        assert_eq!(timeline.sample_frame(0.0), Some("walk_0"));
        assert_eq!(timeline.sample_frame(0.59), Some("walk_0"));
        assert_eq!(timeline.sample_frame(0.6), Some("walk_1"));
        assert_eq!(timeline.sample(0.6), None);
    }

    #[test]
    fn rejects_bad_keys() {
        assert_eq!(Timeline::new(Target::SelfEntity, Property::Y, vec![]).unwrap_err(), ClipError::Empty);
        assert_eq!(
            Timeline::new(Target::SelfEntity, Property::Y, vec![Keyframe::scalar(-1.0, 0.0, Curve::Linear)])
                .unwrap_err(),
            ClipError::NegativeTime
        );
        assert_eq!(
            Timeline::new(Target::SelfEntity, Property::Y, vec![Keyframe::frame(0.0, "a")]).unwrap_err(),
            ClipError::ValueKind("y")
        );
    }

    #[test]
    fn non_finite_time_samples_the_first_key() {
        let timeline = x_timeline(vec![
            Keyframe::scalar(0.5, 2.0, Curve::Linear),
            Keyframe::scalar(1.5, 4.0, Curve::Linear),
        ]);
        assert_eq!(timeline.sample(f32::NAN), Some(2.0));
        assert_eq!(timeline.sample(f32::INFINITY), Some(2.0));
        let frames = Timeline::new(
            Target::SelfEntity,
            Property::Frame,
            vec![Keyframe::frame(0.0, "a"), Keyframe::frame(1.0, "b")],
        )
        .expect("frame timeline");
        assert_eq!(frames.sample_frame(f32::NAN), Some("a"));
    }
}
