use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::models::{TokenKind, TokenPair};
use crate::storage::{ContextId, CookieJar, Persistence, SharedStorage};

/// Synchronous home of the current token pair.
///
/// Absence of a token is `None`, never an error. Implementations must write
/// and clear the pair as a unit; only `set_access` touches a single token.
pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<String>;

    /// Store both tokens. `persistent` pairs survive a process restart.
    fn set_pair(&self, pair: &TokenPair, persistent: bool);

    /// Replace the access token after a renewal, keeping the refresh token.
    fn set_access(&self, token: &str);

    fn clear(&self);

    fn pair(&self) -> Option<TokenPair> {
        Some(TokenPair::new(
            self.get(TokenKind::Access)?,
            self.get(TokenKind::Refresh)?,
        ))
    }
}

/// Token store fanning writes out to the cookie jar and the shared storage.
///
/// Reads prefer the cookie jar and fall back to the shared storage mirror,
/// which is what a context opened after the login sees.
pub struct TieredTokenStore {
    cookies: CookieJar,
    storage: SharedStorage,
    context: ContextId,
    remember_days: i64,
}

impl TieredTokenStore {
    pub fn new(
        cookies: CookieJar,
        storage: SharedStorage,
        context: ContextId,
        remember_days: i64,
    ) -> Self {
        Self {
            cookies,
            storage,
            context,
            remember_days,
        }
    }

    /// Whether the current session was created with "remember me".
    fn is_remembered(&self) -> bool {
        let key = TokenKind::Refresh.key();
        match self.cookies.expiry(key) {
            Some(expires) => expires.is_some(),
            None => self.storage.persistence(key) == Some(Persistence::Durable),
        }
    }

    fn write(&self, kind: TokenKind, value: &str, persistent: bool) {
        let expires = persistent.then(|| Utc::now() + Duration::days(self.remember_days));
        let persistence = if persistent {
            Persistence::Durable
        } else {
            Persistence::Session
        };
        self.cookies.set(kind.key(), value, expires);
        self.storage.set(self.context, kind.key(), value, persistence);
    }
}

impl TokenStore for TieredTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.cookies
            .get(kind.key())
            .or_else(|| self.storage.get(kind.key()))
    }

    fn set_pair(&self, pair: &TokenPair, persistent: bool) {
        self.write(TokenKind::Access, &pair.access, persistent);
        self.write(TokenKind::Refresh, &pair.refresh, persistent);
    }

    fn set_access(&self, token: &str) {
        let persistent = self.is_remembered();
        self.write(TokenKind::Access, token, persistent);
    }

    fn clear(&self) {
        for kind in TokenKind::ALL {
            self.cookies.remove(kind.key());
            self.storage.remove(self.context, kind.key());
        }
    }
}

/// In-memory store for tests and embedders that keep nothing on disk.
#[derive(Default)]
pub struct MemoryTokenStore {
    pair: Mutex<(Option<String>, Option<String>)>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let pair = self.pair.lock();
        match kind {
            TokenKind::Access => pair.0.clone(),
            TokenKind::Refresh => pair.1.clone(),
        }
    }

    fn set_pair(&self, pair: &TokenPair, _persistent: bool) {
        *self.pair.lock() = (Some(pair.access.clone()), Some(pair.refresh.clone()));
    }

    fn set_access(&self, token: &str) {
        self.pair.lock().0 = Some(token.to_string());
    }

    fn clear(&self) {
        *self.pair.lock() = (None, None);
    }
}
