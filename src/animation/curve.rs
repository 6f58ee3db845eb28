/// Easing applied to the interpolation factor between two keyframes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Step,
    Smooth,
    EaseIn,
    EaseOut,
}

impl Curve {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "linear" => Some(Curve::Linear),
            "step" | "stepped" => Some(Curve::Step),
            "smooth" | "smoothstep" => Some(Curve::Smooth),
            "ease_in" | "easein" => Some(Curve::EaseIn),
            "ease_out" | "easeout" => Some(Curve::EaseOut),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Curve::Linear => "linear",
            Curve::Step => "step",
            Curve::Smooth => "smooth",
            Curve::EaseIn => "ease_in",
            Curve::EaseOut => "ease_out",
        }
    }

    /// Maps a linear factor in `[0, 1]` to the eased factor.
    pub fn apply(self, alpha: f32) -> f32 {
        let t = alpha.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::Step => 0.0,
            Curve::Smooth => t * t * (3.0 - 2.0 * t),
            Curve::EaseIn => t * t,
            Curve::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}
