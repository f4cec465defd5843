use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::write_atomically;

/// Cookie jar file name in the state directory
const COOKIE_FILE: &str = "cookies.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cookie {
    value: String,
    /// `None` for session cookies, which are never written to disk
    expires: Option<DateTime<Utc>>,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at <= now).unwrap_or(false)
    }
}

/// Named cookies with optional expiry.
///
/// Session cookies live in memory for the lifetime of the process; cookies
/// with an expiry are persisted and dropped once the expiry passes.
#[derive(Clone)]
pub struct CookieJar {
    cookies: Arc<Mutex<HashMap<String, Cookie>>>,
    /// Held across snapshot and write
    flush_lock: Arc<Mutex<()>>,
    path: Option<PathBuf>,
}

impl CookieJar {
    /// Open the jar backed by `dir/cookies.json`, discarding expired cookies.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(COOKIE_FILE);
        let mut cookies = HashMap::new();

        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read cookie file")?;
            let stored: HashMap<String, Cookie> = serde_json::from_str(&contents)
                .context("Failed to parse cookie file")?;
            let now = Utc::now();
            cookies.extend(stored.into_iter().filter(|(_, c)| !c.is_expired(now)));
            debug!(count = cookies.len(), "Cookies loaded");
        }

        Ok(Self {
            cookies: Arc::new(Mutex::new(cookies)),
            flush_lock: Arc::new(Mutex::new(())),
            path: Some(path),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            cookies: Arc::new(Mutex::new(HashMap::new())),
            flush_lock: Arc::new(Mutex::new(())),
            path: None,
        }
    }

    /// Value of a live cookie.
    pub fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .lock()
            .get(name)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.value.clone())
    }

    /// Expiry of a live cookie; `Some(None)` for a session cookie.
    pub fn expiry(&self, name: &str) -> Option<Option<DateTime<Utc>>> {
        let now = Utc::now();
        self.cookies
            .lock()
            .get(name)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.expires)
    }

    pub fn set(&self, name: &str, value: &str, expires: Option<DateTime<Utc>>) {
        let was_persistent = {
            let mut cookies = self.cookies.lock();
            let previous = cookies.insert(
                name.to_string(),
                Cookie {
                    value: value.to_string(),
                    expires,
                },
            );
            previous.map(|c| c.expires.is_some()).unwrap_or(false)
        };
        if expires.is_some() || was_persistent {
            self.flush();
        }
    }

    pub fn remove(&self, name: &str) {
        let removed = self.cookies.lock().remove(name);
        if removed.map(|c| c.expires.is_some()).unwrap_or(false) {
            self.flush();
        }
    }

    fn flush(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let _flushing = self.flush_lock.lock();
        let now = Utc::now();
        let persistent: HashMap<String, Cookie> = self
            .cookies
            .lock()
            .iter()
            .filter(|(_, c)| c.expires.is_some() && !c.is_expired(now))
            .map(|(name, c)| (name.clone(), c.clone()))
            .collect();

        let result = serde_json::to_string_pretty(&persistent)
            .map_err(std::io::Error::from)
            .and_then(|contents| write_atomically(path, &contents));
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to save cookies");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_cookie_does_not_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = CookieJar::open(dir.path()).expect("open");
        jar.set("session", "s", None);
        jar.set("remembered", "r", Some(Utc::now() + Duration::days(7)));
        assert_eq!(jar.get("session").as_deref(), Some("s"));
        drop(jar);

        let reopened = CookieJar::open(dir.path()).expect("reopen");
        assert_eq!(reopened.get("session"), None);
        assert_eq!(reopened.get("remembered").as_deref(), Some("r"));
    }

    #[test]
    fn test_expired_cookie_is_invisible() {
        let jar = CookieJar::in_memory();
        jar.set("old", "v", Some(Utc::now() - Duration::seconds(1)));
        assert_eq!(jar.get("old"), None);
        assert_eq!(jar.expiry("old"), None);
    }

    #[test]
    fn test_expiry_reports_session_cookie() {
        let jar = CookieJar::in_memory();
        jar.set("s", "v", None);
        assert_eq!(jar.expiry("s"), Some(None));
        jar.remove("s");
        assert_eq!(jar.get("s"), None);
    }

    #[test]
    fn test_concurrent_persistent_cookies_all_reach_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = CookieJar::open(dir.path()).expect("open");
        let expires = Some(Utc::now() + Duration::days(1));

        std::thread::scope(|scope| {
            for thread in 0..4 {
                let jar = jar.clone();
                scope.spawn(move || {
                    for i in 0..20 {
                        jar.set(&format!("t{}-c{}", thread, i), "v", expires);
                    }
                });
            }
        });
        drop(jar);

        let reopened = CookieJar::open(dir.path()).expect("reopen");
        for thread in 0..4 {
            for i in 0..20 {
                let name = format!("t{}-c{}", thread, i);
                assert_eq!(reopened.get(&name).as_deref(), Some("v"), "lost {}", name);
            }
        }
    }

    #[test]
    fn test_removing_persistent_cookie_updates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = CookieJar::open(dir.path()).expect("open");
        jar.set("r", "v", Some(Utc::now() + Duration::days(1)));
        jar.remove("r");
        drop(jar);

        let reopened = CookieJar::open(dir.path()).expect("reopen");
        assert_eq!(reopened.get("r"), None);
    }
}
