mod animator;
mod clip;
mod curve;
mod timeline;

pub use animator::{Animator, AnimatorState, DEFAULT_MIX_DURATION};
pub use clip::{parse_clip_bytes, parse_clip_report, parse_clip_value, AnimationClip, ClipIssue};
pub use curve::Curve;
pub use timeline::{ClipError, KeyValue, Keyframe, Property, Target, Timeline, SELF_TARGET};
