use std::collections::HashMap;
use std::time::Instant;

#[derive(Clone, Copy, Debug)]
pub struct PassTimingSummary {
    pub name: &'static str,
    pub last_ms: f32,
    pub average_ms: f32,
    pub max_ms: f32,
    pub samples: u64,
}

#[derive(Default)]
struct PassTiming {
    last_ms: f32,
    total_ms: f32,
    max_ms: f32,
    samples: u64,
}

/// Per-pass timings of `SceneWorld::tick`.
#[derive(Default)]
pub struct FrameProfiler {
    timings: HashMap<&'static str, PassTiming>,
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self { timings: HashMap::new() }
    }

    pub fn record_since(&mut self, name: &'static str, started: Instant) {
        self.record(name, started.elapsed().as_secs_f32() * 1000.0);
    }

    pub fn record(&mut self, name: &'static str, duration_ms: f32) {
        let entry = self.timings.entry(name).or_default();
        entry.last_ms = duration_ms;
        entry.max_ms = entry.max_ms.max(duration_ms);
        entry.total_ms += duration_ms;
        entry.samples += 1;
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    /// Slowest pass (by last sample) first.
    pub fn summaries(&self) -> Vec<PassTimingSummary> {
        let mut out: Vec<PassTimingSummary> = self
            .timings
            .iter()
            .map(|(&name, timing)| PassTimingSummary {
                name,
                last_ms: timing.last_ms,
                average_ms: if timing.samples == 0 { 0.0 } else { timing.total_ms / timing.samples as f32 },
                max_ms: timing.max_ms,
                samples: timing.samples,
            })
            .collect();
        out.sort_by(|a, b| b.last_ms.partial_cmp(&a.last_ms).unwrap_or(std::cmp::Ordering::Equal));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_track_average_and_max() {
        let mut profiler = FrameProfiler::new();
        profiler.record("update", 2.0);
        profiler.record("update", 4.0);
        profiler.record("sweep", 1.0);
        let summaries = profiler.summaries();
        assert_eq!(summaries[0].name, "update");
        assert_eq!(summaries[0].samples, 2);
        assert!((summaries[0].average_ms - 3.0).abs() < 1e-6);
        assert!((summaries[0].max_ms - 4.0).abs() < 1e-6);
        profiler.reset();
        assert!(profiler.summaries().is_empty());
    }
}
