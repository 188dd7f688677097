//! Path-keyed entry cache.
//!
//! The cache is the only shared mutable state in the pipeline. Lookups are
//! read-through: the first caller for a path reads the file (and any source
//! map it references) and every later caller gets the same entry. Each entry
//! sits behind an async mutex, which is what keeps stages for one file
//! strictly sequential while different files proceed concurrently.

use crate::Result;
use crate::entry::Entry;
use crate::runtime::{Runtime, read_to_string};
use crate::sourcemap::load_source_map_from_comment;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type SharedEntry = Arc<tokio::sync::Mutex<Entry>>;

#[derive(Debug, Clone, Default)]
pub struct EntryCache {
    entries: Arc<DashMap<PathBuf, SharedEntry>>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `path`, created from `initial` (or a file read) when absent.
    ///
    /// With `load_maps`, a sourceMappingURL in the contents is followed and
    /// the map it points at seeds the entry's chain. A broken or missing map
    /// is ignored.
    pub async fn get_or_create(
        &self,
        path: &Path,
        initial: Option<String>,
        runtime: &dyn Runtime,
        load_maps: bool,
    ) -> Result<SharedEntry> {
        if let Some(entry) = self.get(path) {
            return Ok(entry);
        }

        let contents = match initial {
            Some(contents) => contents,
            None => read_to_string(runtime, path).await?,
        };
        let input_map = if load_maps {
            load_source_map_from_comment(&contents, Some(path), runtime).await
        } else {
            None
        };

        let mut entry = Entry::new(path, contents);
        if let Some(map) = input_map {
            tracing::debug!(path = %path.display(), "seeded entry with input source map");
            entry = entry.with_input_map(map);
        }

        // another task may have created the entry while we were reading
        let shared = self
            .entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(entry)))
            .value()
            .clone();
        Ok(shared)
    }

    pub fn get(&self, path: &Path) -> Option<SharedEntry> {
        self.entries.get(path).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, path: &Path) -> Option<SharedEntry> {
        self.entries.remove(path).map(|(_, entry)| entry)
    }

    /// Drop every entry; the next build starts from fresh reads.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRuntime;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_once_and_returns_same_entry() {
        let cache = EntryCache::new();
        let runtime = TestRuntime::default();
        let path = Path::new("/virtual/a.js");

        let first = cache
            .get_or_create(path, Some("a();".to_string()), &runtime, true)
            .await
            .unwrap();
        let second = cache
            .get_or_create(path, Some("ignored".to_string()), &runtime, true)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.code(), "a();");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn reads_file_when_no_initial_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.js");
        std::fs::write(&path, "export const a = 1;").unwrap();

        let cache = EntryCache::new();
        let runtime = TestRuntime::new(temp.path().to_path_buf());
        let entry = cache.get_or_create(&path, None, &runtime, true).await.unwrap();
        assert_eq!(entry.lock().await.code(), "export const a = 1;");

        // cached entries are not re-read
        std::fs::write(&path, "changed").unwrap();
        let entry = cache.get_or_create(&path, None, &runtime, true).await.unwrap();
        assert_eq!(entry.lock().await.code(), "export const a = 1;");
    }

    #[tokio::test]
    async fn missing_file_is_a_runtime_error() {
        let cache = EntryCache::new();
        let runtime = TestRuntime::default();
        let err = cache
            .get_or_create(Path::new("/definitely/missing.js"), None, &runtime, true)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Runtime(_)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn seeds_input_map_from_comment() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.js");
        std::fs::write(
            temp.path().join("a.js.map"),
            r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA"}"#,
        )
        .unwrap();
        let contents = "a();\n//# sourceMappingURL=a.js.map\n".to_string();

        let runtime = TestRuntime::new(temp.path().to_path_buf());
        let cache = EntryCache::new();
        let entry = cache
            .get_or_create(&path, Some(contents.clone()), &runtime, true)
            .await
            .unwrap();
        let entry = entry.lock().await;
        assert_eq!(entry.source_maps().len(), 1);
        assert_eq!(entry.source_maps()[0].sources, vec!["a.ts".to_string()]);

        let other = EntryCache::new();
        let entry = other
            .get_or_create(&path, Some(contents), &runtime, false)
            .await
            .unwrap();
        assert!(entry.lock().await.source_maps().is_empty());
    }

    #[tokio::test]
    async fn concurrent_creators_converge() {
        let cache = EntryCache::new();
        let runtime = Arc::new(TestRuntime::default());
        let path = PathBuf::from("/virtual/shared.js");

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let runtime = runtime.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_create(&path, Some(format!("v{i}")), runtime.as_ref(), false)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut entries = Vec::new();
        for task in tasks {
            entries.push(task.await.unwrap());
        }
        assert!(entries.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn clear_drops_entries() {
        let cache = EntryCache::new();
        let runtime = TestRuntime::default();
        cache
            .get_or_create(Path::new("/v/a.js"), Some(String::new()), &runtime, false)
            .await
            .unwrap();
        assert!(cache.remove(Path::new("/v/a.js")).is_some());
        cache
            .get_or_create(Path::new("/v/b.js"), Some(String::new()), &runtime, false)
            .await
            .unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
