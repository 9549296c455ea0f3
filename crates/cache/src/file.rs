//! Persistent small tier backed by a single JSON document
//!
//! The document is rewritten atomically on every mutation:
//! - Write to a temporary file in the same directory
//! - Flush and rename over the target
//!
//! so a crash never leaves a half-written store behind.

use crate::error::{CacheError, CacheResult};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

const TIER: &str = "local";

/// Default byte quota, in line with browser local storage limits
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

type Entries = BTreeMap<String, String>;

/// Quota-limited store persisted to one file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota_bytes: u64,
    entries: Mutex<Entries>,
    // Serializes mutate-then-write so the file always reflects the latest map
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Opens (or creates) the store at `path` with the default quota
    pub fn open(path: impl Into<PathBuf>) -> CacheResult<Self> {
        Self::with_quota(path, DEFAULT_QUOTA_BYTES)
    }

    /// Opens (or creates) the store at `path` with a custom byte quota
    pub fn with_quota(path: impl Into<PathBuf>, quota_bytes: u64) -> CacheResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                log::info!("Created cache directory: {}", parent.display());
            }
        }

        let entries = Self::load(&path)?;
        log::debug!(
            "Opened local store at {} ({} entries)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            quota_bytes,
            entries: Mutex::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configured byte quota
    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    /// Reads the document; empty or corrupt documents start a fresh store
    fn load(path: &Path) -> CacheResult<Entries> {
        if !path.exists() {
            return Ok(Entries::new());
        }

        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Entries::new());
        }

        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let backup = path.with_extension("json.corrupt");
                log::warn!(
                    "Local store at {} is corrupt ({}), moving it to {}",
                    path.display(),
                    e,
                    backup.display()
                );
                fs::rename(path, &backup)?;
                Ok(Entries::new())
            }
        }
    }

    /// Applies `mutate` to a copy of the map, enforces the quota, persists,
    /// then commits the copy
    ///
    /// The quota only rejects writes that grow the file, so a store reopened
    /// over its limit can still be shrunk.
    async fn apply<F>(&self, mutate: F) -> CacheResult<usize>
    where
        F: FnOnce(&mut Entries) -> usize,
    {
        let _guard = self.write_lock.lock().await;

        let (next, changed, serialized, current_len) = {
            let current = self.lock()?;
            let current_len = serde_json::to_string(&*current)?.len();
            let mut next = current.clone();
            let changed = mutate(&mut next);
            let serialized = serde_json::to_string(&next)?;
            (next, changed, serialized, current_len)
        };

        let grows = serialized.len() > current_len;
        if grows && serialized.len() as u64 > self.quota_bytes {
            return Err(CacheError::QuotaExceeded {
                tier: TIER,
                needed: serialized.len() as u64,
                limit: self.quota_bytes,
            });
        }

        if changed > 0 {
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &serialized))
                .await
                .map_err(|e| CacheError::backend(TIER, e.to_string()))??;
        }

        *self.lock()? = next;
        Ok(changed)
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::backend(TIER, "lock poisoned"))
    }
}

/// Writes content to a temporary file next to `path` and renames it into place
fn write_atomic(path: &Path, content: &str) -> CacheResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content.as_bytes())?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> CacheResult<()> {
        let key = key.to_string();
        self.apply(move |entries| {
            entries.insert(key, value);
            1
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.apply(|entries| usize::from(entries.remove(key).is_some()))
            .await?;
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        self.apply(|entries| {
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(prefix));
            before - entries.len()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("local.json");
        (temp_dir, path)
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let (_temp_dir, path) = setup_test_dir();

        let store = FileStore::open(&path).unwrap();
        store.set("tradecost:a", "1".to_string()).await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("tradecost:a").await.unwrap(),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn test_quota_exceeded_leaves_store_unchanged() {
        let (_temp_dir, path) = setup_test_dir();
        let store = FileStore::with_quota(&path, 64).unwrap();

        store.set("small", "x".to_string()).await.unwrap();
        let err = store.set("big", "y".repeat(128)).await.unwrap_err();
        assert!(err.is_quota());

        assert_eq!(store.get("big").await.unwrap(), None);
        assert_eq!(store.get("small").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_over_quota_store_can_still_shrink() {
        let (_temp_dir, path) = setup_test_dir();
        let store = FileStore::open(&path).unwrap();
        for key in ["a", "b", "c"] {
            store.set(key, "x".repeat(100)).await.unwrap();
        }
        drop(store);

        let store = FileStore::with_quota(&path, 100).unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.clear("b").await.unwrap(), 1);

        let err = store.set("d", "x".repeat(100)).await.unwrap_err();
        assert!(err.is_quota());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("c").await.unwrap(), Some("x".repeat(100)));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let (_temp_dir, path) = setup_test_dir();
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("anything").await.unwrap(), None);
        assert!(path.with_extension("json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("local.json");

        let store = FileStore::open(&path).unwrap();
        store.set("k", "v".to_string()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_clear_by_prefix_persists() {
        let (_temp_dir, path) = setup_test_dir();
        let store = FileStore::open(&path).unwrap();
        store.set("tradecost:a", "1".to_string()).await.unwrap();
        store.set("tradecost:b", "2".to_string()).await.unwrap();
        store.set("other:c", "3".to_string()).await.unwrap();

        assert_eq!(store.clear("tradecost:").await.unwrap(), 2);
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("tradecost:a").await.unwrap(), None);
        assert_eq!(reopened.get("other:c").await.unwrap(), Some("3".to_string()));
    }
}
