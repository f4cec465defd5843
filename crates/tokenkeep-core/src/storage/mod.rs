//! Backing tiers for persisted session state.
//!
//! This module provides:
//! - `SharedStorage`: key/value area shared by every execution context,
//!   with change notifications (the cross-context tier)
//! - `CookieJar`: named cookies with optional expiry (the request-scoped tier)
//!
//! Both flush their durable entries to JSON files in the state directory
//! and keep everything else in memory for the lifetime of the process.

pub mod cookies;
pub mod shared;

use std::fmt;

pub use cookies::CookieJar;
pub use shared::{Persistence, SharedStorage, StorageEvent};

/// Identity of one execution context sharing a `SharedStorage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Write `contents` next to `path` and rename over it so readers never see a torn file.
///
/// Each call uses its own temporary file. Callers serialize flushes of one
/// file themselves so snapshots land in the order they were taken.
fn write_atomically(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("json.{:016x}.tmp", rand::random::<u64>()));
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}
