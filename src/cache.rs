//! Cache port for fetched snapshots and derived tables.
//!
//! Values are stored as JSON text. Callers go through [`get_json`] /
//! [`put_json`] or the [`CachedUniverse`] / [`CachedReturns`] decorators; a
//! cache is always passed in explicitly, never looked up globally.

use crate::error::{NeutralBookError, Result};
use crate::provider::{ReturnsProvider, UniverseProvider};
use crate::types::{AssetRecord, ReturnsTable, ScheduleEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Key-value store of JSON documents.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    /// Remove every entry, returning how many were removed.
    fn clear(&self) -> Result<usize>;
}

/// Read and deserialize a cached value.
pub fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Serialize and store a value.
pub fn put_json<T: Serialize>(store: &dyn CacheStore, key: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    store.put(key, &text)
}

/// Return the cached value for `key`, or compute, store and return it.
pub fn get_or_insert_with<T, F>(store: &dyn CacheStore, key: &str, compute: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if let Some(hit) = get_json(store, key)? {
        debug!("Cache hit: {}", key);
        return Ok(hit);
    }
    let value = compute()?;
    put_json(store, key, &value)?;
    Ok(value)
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| NeutralBookError::CacheError("memory cache lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let n = entries.len();
        entries.clear();
        Ok(n)
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    /// Open (creating if needed) a cache directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            NeutralBookError::CacheError(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        info!("Opened cache at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl CacheStore for DirCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key), value)?;
        debug!("Cached {}", key);
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!("Cleared {} cache entries from {}", removed, self.dir.display());
        Ok(removed)
    }
}

/// Universe provider that memoizes snapshots by snapshot date.
pub struct CachedUniverse<P> {
    inner: P,
    store: Arc<dyn CacheStore>,
}

impl<P: UniverseProvider> CachedUniverse<P> {
    pub fn new(inner: P, store: Arc<dyn CacheStore>) -> Self {
        Self { inner, store }
    }
}

impl<P: UniverseProvider> UniverseProvider for CachedUniverse<P> {
    fn universe(&self, entry: &ScheduleEntry) -> Result<Vec<AssetRecord>> {
        let key = format!("universe-{}", entry.snapshot);
        get_or_insert_with(self.store.as_ref(), &key, || self.inner.universe(entry))
    }
}

/// Returns provider that memoizes the whole table under one key.
pub struct CachedReturns<P> {
    inner: P,
    store: Arc<dyn CacheStore>,
    key: String,
}

impl<P: ReturnsProvider> CachedReturns<P> {
    pub fn new(inner: P, store: Arc<dyn CacheStore>, key: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            key: key.into(),
        }
    }
}

impl<P: ReturnsProvider> ReturnsProvider for CachedReturns<P> {
    fn daily_returns(&self) -> Result<ReturnsTable> {
        let table: ReturnsTable =
            get_or_insert_with(self.store.as_ref(), &self.key, || self.inner.daily_returns())?;
        // The column index is not serialized; rebuild it.
        ReturnsTable::new(
            table.dates().to_vec(),
            table.tickers().to_vec(),
            (0..table.dates().len()).map(|i| table.row(i).to_vec()).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a").unwrap(), None);
        put_json(&cache, "a", &vec![1.0, 2.5]).unwrap();
        let back: Option<Vec<f64>> = get_json(&cache, "a").unwrap();
        assert_eq!(back, Some(vec![1.0, 2.5]));
        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dir_cache_persists_and_clears() {
        let tmp = TempDir::new().unwrap();
        let cache = DirCache::new(tmp.path().join("cache")).unwrap();
        cache.put("universe-2024-03-14", "[]").unwrap();
        cache.put("weird/key:1", "{}").unwrap();

        let reopened = DirCache::new(cache.dir()).unwrap();
        assert_eq!(reopened.get("universe-2024-03-14").unwrap().as_deref(), Some("[]"));
        assert_eq!(reopened.get("weird/key:1").unwrap().as_deref(), Some("{}"));
        assert_eq!(reopened.clear().unwrap(), 2);
        assert_eq!(reopened.get("universe-2024-03-14").unwrap(), None);
    }

    struct CountingUniverse {
        calls: AtomicUsize,
        snapshots: BTreeMap<NaiveDate, Vec<AssetRecord>>,
    }

    impl UniverseProvider for CountingUniverse {
        fn universe(&self, entry: &ScheduleEntry) -> Result<Vec<AssetRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.snapshots.universe(entry)
        }
    }

    #[test]
    fn test_cached_universe_fetches_once() {
        let entry = ScheduleEntry::window(
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 22).unwrap(),
        );
        let inner = CountingUniverse {
            calls: AtomicUsize::new(0),
            snapshots: BTreeMap::from([(
                entry.snapshot,
                vec![AssetRecord::new("AAA", 1.0, "Energy", 1e6, 0.02)],
            )]),
        };
        let cached = CachedUniverse::new(inner, Arc::new(MemoryCache::new()));

        let first = cached.universe(&entry).unwrap();
        let second = cached.universe(&entry).unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_returns_rebuilds_column_index() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let table = ReturnsTable::new(
            vec![d(2), d(3)],
            vec!["AAA".into(), "BBB".into()],
            vec![vec![0.01, 0.02], vec![-0.01, 0.0]],
        )
        .unwrap();
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let cached = CachedReturns::new(table.clone(), store.clone(), "returns");

        cached.daily_returns().unwrap();
        let from_cache = cached.daily_returns().unwrap();
        assert_eq!(from_cache.column("BBB"), Some(1));
        assert!(store.get("returns").unwrap().is_some());
    }
}
