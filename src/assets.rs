use crate::animation::{parse_clip_bytes, AnimationClip};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

/// Opaque handle to something a renderer can draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawableHandle(pub u32);

/// Resolves asset paths to drawable handles.
pub trait AssetTracker: Send + Sync {
    fn resolve(&mut self, path: &str) -> Option<DrawableHandle>;

    fn release(&mut self, _handle: DrawableHandle) {}
}

/// Interns each path to a stable handle and counts outstanding resolves.
#[derive(Default)]
pub struct PathAssetTracker {
    handles: HashMap<String, DrawableHandle>,
    paths: HashMap<DrawableHandle, String>,
    refs: HashMap<DrawableHandle, usize>,
    next: u32,
}

impl PathAssetTracker {
    pub fn ref_count(&self, path: &str) -> usize {
        self.handles.get(path).and_then(|handle| self.refs.get(handle)).copied().unwrap_or(0)
    }

    pub fn path(&self, handle: DrawableHandle) -> Option<&str> {
        self.paths.get(&handle).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl AssetTracker for PathAssetTracker {
    fn resolve(&mut self, path: &str) -> Option<DrawableHandle> {
        if path.is_empty() {
            return None;
        }
        let handle = match self.handles.get(path) {
            Some(handle) => *handle,
            None => {
                self.next += 1;
                let handle = DrawableHandle(self.next);
                self.handles.insert(path.to_string(), handle);
                self.paths.insert(handle, path.to_string());
                handle
            }
        };
        *self.refs.entry(handle).or_insert(0) += 1;
        Some(handle)
    }

    fn release(&mut self, handle: DrawableHandle) {
        if let Some(count) = self.refs.get_mut(&handle) {
            *count -= 1;
            if *count == 0 {
                self.refs.remove(&handle);
                if let Some(path) = self.paths.remove(&handle) {
                    self.handles.remove(&path);
                }
            }
        }
    }
}

/// Keyed cache of animation clips loaded from JSON files, with reference counts.
#[derive(Default)]
pub struct ClipStore {
    clips: HashMap<String, Arc<AnimationClip>>,
    clip_sources: HashMap<String, String>,
    clip_refs: HashMap<String, usize>,
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_clip(&mut self, key: &str, json_path: &str) -> Result<Arc<AnimationClip>> {
        let bytes = fs::read(json_path).with_context(|| format!("Failed to read clip file {json_path}"))?;
        let clip = Arc::new(parse_clip_bytes(&bytes, key, json_path)?);
        self.clips.insert(key.to_string(), Arc::clone(&clip));
        self.clip_sources.insert(key.to_string(), json_path.to_string());
        Ok(clip)
    }

    /// Adds a clip built in code. It has no source file and cannot be reloaded.
    pub fn insert_clip(&mut self, key: &str, clip: AnimationClip) -> Arc<AnimationClip> {
        let clip = Arc::new(clip);
        self.clips.insert(key.to_string(), Arc::clone(&clip));
        self.clip_sources.remove(key);
        clip
    }

    pub fn retain_clip(&mut self, key: &str, json_path: Option<&str>) -> Result<Arc<AnimationClip>> {
        if let Some(clip) = self.clips.get(key).cloned() {
            *self.clip_refs.entry(key.to_string()).or_insert(0) += 1;
            if let Some(path) = json_path {
                self.clip_sources.insert(key.to_string(), path.to_string());
            }
            return Ok(clip);
        }
        let path_owned = if let Some(path) = json_path {
            path.to_string()
        } else if let Some(stored) = self.clip_sources.get(key) {
            stored.clone()
        } else {
            return Err(anyhow!("Clip '{key}' is not loaded and no JSON path provided to retain it."));
        };
        let clip = self.load_clip(key, &path_owned)?;
        self.clip_refs.insert(key.to_string(), 1);
        Ok(clip)
    }

    /// Drops one reference; the clip is evicted when the count reaches zero.
    pub fn release_clip(&mut self, key: &str) -> bool {
        if let Some(count) = self.clip_refs.get_mut(key) {
            if *count > 0 {
                *count -= 1;
                if *count == 0 {
                    self.clip_refs.remove(key);
                    self.clips.remove(key);
                    self.clip_sources.remove(key);
                }
                return true;
            }
        }
        false
    }

    pub fn clip(&self, key: &str) -> Option<Arc<AnimationClip>> {
        self.clips.get(key).cloned()
    }

    pub fn clip_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.clips.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clip_source(&self, key: &str) -> Option<&str> {
        self.clip_sources.get(key).map(|s| s.as_str())
    }

    pub fn clip_ref_count(&self, key: &str) -> usize {
        self.clip_refs.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_interns_paths_and_counts_refs() {
        let mut tracker = PathAssetTracker::default();
        let a = tracker.resolve("sprites/hero.png").expect("handle");
        let b = tracker.resolve("sprites/hero.png").expect("handle");
        assert_eq!(a, b);
        assert_eq!(tracker.ref_count("sprites/hero.png"), 2);
        assert!(tracker.resolve("").is_none());

        tracker.release(a);
        assert_eq!(tracker.path(a), Some("sprites/hero.png"));
        tracker.release(a);
        assert_eq!(tracker.ref_count("sprites/hero.png"), 0);
        assert!(tracker.is_empty());
    }
}
