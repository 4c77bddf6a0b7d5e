// src/cache.rs

//! Local, reload-surviving key/value cache.
//!
//! This is the storage medium behind in-progress attempts and the
//! "already submitted" ledger. Values are JSON strings; readers treat any
//! value that fails to parse as absent.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        lock(&self.entries).insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }
}

/// Cache persisted as a single JSON object on disk.
///
/// Changes land in memory and mark the cache dirty; [`FileCache::flush`]
/// writes a temp file next to the target and renames it into place, so the
/// file on disk is always a complete snapshot. The server flushes from a
/// background task (see [`FileCache::spawn_flusher`]) and once more on shutdown.
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    dirty: AtomicBool,
    writer: Mutex<()>,
}

impl FileCache {
    /// Opens (or starts) the cache file. A missing file yields an empty cache;
    /// a corrupt one is moved aside to `<file>.corrupt` first.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                let aside = sibling(&path, "corrupt");
                tracing::warn!(
                    "Local cache {:?} is corrupt, moving it to {:?} and starting empty: {}",
                    path,
                    aside,
                    e
                );
                if let Err(e) = fs::rename(&path, &aside) {
                    tracing::warn!("Could not move corrupt cache aside: {}", e);
                }
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
            writer: Mutex::new(()),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Writes the current entries to disk if anything changed since the last flush.
    pub fn flush(&self) -> io::Result<()> {
        let _writer = lock(&self.writer);
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let snapshot = serde_json::to_string(&*lock(&self.entries));
        let result = snapshot
            .map_err(io::Error::other)
            .and_then(|raw| self.replace_file(raw.as_bytes()));
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    fn replace_file(&self, contents: &[u8]) -> io::Result<()> {
        let tmp = sibling(&self.path, "tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
    }

    /// Flushes every `period` on the blocking pool until the handle is aborted.
    pub fn spawn_flusher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !cache.is_dirty() {
                    continue;
                }
                let task = cache.clone();
                match tokio::task::spawn_blocking(move || task.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!("Failed to write local cache {:?}: {}", cache.path, e)
                    }
                    Err(e) => tracing::error!("Local cache flush task failed: {}", e),
                }
            }
        })
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        lock(&self.entries).insert(key.to_string(), value);
        self.dirty.store(true, Ordering::Release);
    }

    fn remove(&self, key: &str) {
        if lock(&self.entries).remove(key).is_some() {
            self.dirty.store(true, Ordering::Release);
        }
    }
}

/// A view of a shared cache with every key prefixed by `scope`.
#[derive(Clone)]
pub struct ScopedCache {
    inner: Arc<dyn LocalCache>,
    scope: String,
}

impl ScopedCache {
    pub fn new(inner: Arc<dyn LocalCache>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.scope, key)
    }

    /// Reads and parses a JSON value; unparsable values count as absent.
    pub fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring malformed cache entry {}: {}", self.key(key), e);
                None
            }
        }
    }

    pub fn write<T: serde::Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw),
            Err(e) => tracing::warn!("Failed to encode cache entry {}: {}", self.key(key), e),
        }
    }
}

impl LocalCache for ScopedCache {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(&self.key(key))
    }

    fn set(&self, key: &str, value: String) {
        self.inner.set(&self.key(key), value)
    }

    fn remove(&self, key: &str) {
        self.inner.remove(&self.key(key))
    }
}
