//! Data models shared by the session components.
//!
//! - `TokenPair`, `TokenKind`: the two bearer credentials and their storage keys
//! - `User`: profile returned by `GET /auth/user/`
//! - `LoginResponse`: what `AuthSession::login` resolves with
//! - `BroadcastEvent`: the cross-context login/logout signal

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 2] = [TokenKind::Access, TokenKind::Refresh];

    /// Cookie name and shared-storage key for this token.
    pub fn key(self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum BroadcastKind {
    Login,
    Logout,
}

fn default_remember() -> bool {
    true
}

/// Login/logout signal written to the shared storage sync key.
///
/// Serialized as `{"type": "login", "tokens": {...}, "timestamp": 1700000000000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub kind: BroadcastKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default = "default_remember")]
    pub remember: bool,
}

impl BroadcastEvent {
    pub fn login(tokens: TokenPair, remember: bool) -> Self {
        Self {
            kind: BroadcastKind::Login,
            tokens: Some(tokens),
            timestamp: Utc::now().timestamp_millis(),
            remember,
        }
    }

    pub fn logout() -> Self {
        Self {
            kind: BroadcastKind::Logout,
            tokens: None,
            timestamp: Utc::now().timestamp_millis(),
            remember: false,
        }
    }
}
