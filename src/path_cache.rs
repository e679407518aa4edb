//! Canonical path resolution (4.A), memoised with concurrent reads and
//! per-shard-serialised writes via `dashmap`.

use crate::config::Settings;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

pub struct PathCache {
    cache: DashMap<(PathBuf, Option<PathBuf>), PathBuf>,
    prefix_mappings: Vec<(PathBuf, PathBuf)>,
}

impl PathCache {
    pub fn new(prefix_mappings: Vec<(PathBuf, PathBuf)>) -> Self {
        Self {
            cache: DashMap::new(),
            prefix_mappings,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.prefix_mappings.clone())
    }

    /// Resolves `path` (relative to `workdir` if not absolute) to a
    /// canonical, prefix-mapped absolute path. Non-existent paths are still
    /// resolved lexically so queries about not-yet-indexed files produce a
    /// stable key.
    pub fn resolve(&self, path: &Path, workdir: Option<&Path>) -> PathBuf {
        let key = (path.to_path_buf(), workdir.map(Path::to_path_buf));
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            workdir.unwrap_or_else(|| Path::new(".")).join(path)
        };
        let lexical = lexically_normalize(&absolute);
        let mapped = self.apply_prefix_mappings(&lexical);

        self.cache.insert(key, mapped.clone());
        mapped
    }

    fn apply_prefix_mappings(&self, path: &Path) -> PathBuf {
        for (from, to) in &self.prefix_mappings {
            if let Ok(suffix) = path.strip_prefix(from) {
                return to.join(suffix);
            }
        }
        path.to_path_buf()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Resolves `.`/`..` components without touching the filesystem.
fn lexically_normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_path_against_workdir() {
        let cache = PathCache::new(vec![]);
        let resolved = cache.resolve(Path::new("a.c"), Some(Path::new("/proj/src")));
        assert_eq!(resolved, PathBuf::from("/proj/src/a.c"));
    }

    #[test]
    fn normalizes_dot_dot_components() {
        let cache = PathCache::new(vec![]);
        let resolved = cache.resolve(Path::new("/proj/src/../include/a.h"), None);
        assert_eq!(resolved, PathBuf::from("/proj/include/a.h"));
    }

    #[test]
    fn applies_prefix_mapping() {
        let cache = PathCache::new(vec![(PathBuf::from("/hermetic/src"), PathBuf::from("/home/dev/src"))]);
        let resolved = cache.resolve(Path::new("/hermetic/src/x.c"), None);
        assert_eq!(resolved, PathBuf::from("/home/dev/src/x.c"));
    }

    #[test]
    fn repeated_resolution_hits_cache() {
        let cache = PathCache::new(vec![]);
        let first = cache.resolve(Path::new("/a/b.c"), None);
        let second = cache.resolve(Path::new("/a/b.c"), None);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
