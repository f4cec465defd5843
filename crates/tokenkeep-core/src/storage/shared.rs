use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{write_atomically, ContextId};

/// Shared storage file name in the state directory
const STORAGE_FILE: &str = "storage.json";

/// Capacity of the change notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long a stored value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Flushed to disk, survives a process restart
    Durable,
    /// Held in memory until the process exits
    Session,
}

/// Change notification for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// The context whose write caused this event
    pub origin: ContextId,
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    persistence: Persistence,
}

struct Inner {
    entries: Mutex<HashMap<String, StoredValue>>,
    /// Held across snapshot and write
    flush_lock: Mutex<()>,
    path: Option<PathBuf>,
    events: broadcast::Sender<StorageEvent>,
}

/// Key/value store shared by every context holding a clone of the handle.
///
/// Reads are synchronous. Every write is announced to subscribers, tagged
/// with the writing context so listeners can skip their own writes.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Inner>,
}

impl SharedStorage {
    /// Open the storage backed by `dir/storage.json`, loading durable entries.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(STORAGE_FILE);
        let mut entries = HashMap::new();

        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read shared storage file")?;
            let durable: HashMap<String, String> = serde_json::from_str(&contents)
                .context("Failed to parse shared storage file")?;
            debug!(keys = durable.len(), "Shared storage loaded");
            entries.extend(durable.into_iter().map(|(key, value)| {
                (
                    key,
                    StoredValue {
                        value,
                        persistence: Persistence::Durable,
                    },
                )
            }));
        }

        Ok(Self::with_entries(entries, Some(path)))
    }

    /// Storage that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::with_entries(HashMap::new(), None)
    }

    fn with_entries(entries: HashMap<String, StoredValue>, path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(entries),
                flush_lock: Mutex::new(()),
                path,
                events,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|stored| stored.value.clone())
    }

    pub fn persistence(&self, key: &str) -> Option<Persistence> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|stored| stored.persistence)
    }

    pub fn set(&self, origin: ContextId, key: &str, value: &str, persistence: Persistence) {
        let touches_disk = {
            let mut entries = self.inner.entries.lock();
            let previous = entries.insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    persistence,
                },
            );
            persistence == Persistence::Durable
                || previous.map(|p| p.persistence == Persistence::Durable).unwrap_or(false)
        };
        if touches_disk {
            self.flush();
        }
        self.notify(origin, key, Some(value.to_string()));
    }

    pub fn remove(&self, origin: ContextId, key: &str) {
        let removed = self.inner.entries.lock().remove(key);
        let Some(removed) = removed else {
            return;
        };
        if removed.persistence == Persistence::Durable {
            self.flush();
        }
        self.notify(origin, key, None);
    }

    /// Remove `key` only while it still holds `expected`.
    pub fn remove_if(&self, origin: ContextId, key: &str, expected: &str) -> bool {
        let removed = {
            let mut entries = self.inner.entries.lock();
            match entries.get(key) {
                Some(stored) if stored.value == expected => entries.remove(key),
                _ => None,
            }
        };
        let Some(removed) = removed else {
            return false;
        };
        if removed.persistence == Persistence::Durable {
            self.flush();
        }
        self.notify(origin, key, None);
        true
    }

    /// Subscribe to change notifications for every key.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }

    fn notify(&self, origin: ContextId, key: &str, new_value: Option<String>) {
        // No receivers is fine: nobody else is listening yet
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin,
        });
    }

    fn flush(&self) {
        let Some(ref path) = self.inner.path else {
            return;
        };
        let _flushing = self.inner.flush_lock.lock();
        let durable: HashMap<String, String> = self
            .inner
            .entries
            .lock()
            .iter()
            .filter(|(_, stored)| stored.persistence == Persistence::Durable)
            .map(|(key, stored)| (key.clone(), stored.value.clone()))
            .collect();

        let result = serde_json::to_string_pretty(&durable)
            .map_err(std::io::Error::from)
            .and_then(|contents| write_atomically(path, &contents));
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to save shared storage");
        }
    }
}

impl std::fmt::Debug for SharedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStorage")
            .field("path", &self.inner.path)
            .field("keys", &self.inner.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_entries_do_not_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let origin = ContextId::random();

        let storage = SharedStorage::open(dir.path()).expect("open");
        storage.set(origin, "kept", "1", Persistence::Durable);
        storage.set(origin, "dropped", "2", Persistence::Session);
        assert_eq!(storage.get("dropped").as_deref(), Some("2"));
        drop(storage);

        let reopened = SharedStorage::open(dir.path()).expect("reopen");
        assert_eq!(reopened.get("kept").as_deref(), Some("1"));
        assert_eq!(reopened.get("dropped"), None);
    }

    #[test]
    fn test_downgrading_to_session_removes_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let origin = ContextId::random();

        let storage = SharedStorage::open(dir.path()).expect("open");
        storage.set(origin, "token", "durable", Persistence::Durable);
        storage.set(origin, "token", "volatile", Persistence::Session);
        drop(storage);

        let reopened = SharedStorage::open(dir.path()).expect("reopen");
        assert_eq!(reopened.get("token"), None);
    }

    #[test]
    fn test_writes_are_announced_with_origin() {
        let storage = SharedStorage::in_memory();
        let mut rx = storage.subscribe();
        let origin = ContextId::random();

        storage.set(origin, "k", "v", Persistence::Session);
        storage.remove(origin, "k");
        // Removing a missing key is silent
        storage.remove(origin, "k");

        let first = rx.try_recv().expect("set event");
        assert_eq!(first.key, "k");
        assert_eq!(first.new_value.as_deref(), Some("v"));
        assert_eq!(first.origin, origin);

        let second = rx.try_recv().expect("remove event");
        assert_eq!(second.new_value, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_durable_writes_all_reach_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SharedStorage::open(dir.path()).expect("open");

        std::thread::scope(|scope| {
            for thread in 0..4 {
                let storage = storage.clone();
                scope.spawn(move || {
                    let origin = ContextId::random();
                    for i in 0..20 {
                        let key = format!("t{}-k{}", thread, i);
                        storage.set(origin, &key, &i.to_string(), Persistence::Durable);
                    }
                });
            }
        });
        drop(storage);

        let reopened = SharedStorage::open(dir.path()).expect("reopen");
        for thread in 0..4 {
            for i in 0..20 {
                let key = format!("t{}-k{}", thread, i);
                assert_eq!(reopened.get(&key), Some(i.to_string()), "lost {}", key);
            }
        }
        let leftovers = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_clones_share_entries() {
        let storage = SharedStorage::in_memory();
        let other = storage.clone();
        storage.set(ContextId::random(), "k", "v", Persistence::Session);
        assert_eq!(other.get("k").as_deref(), Some("v"));
    }
}
