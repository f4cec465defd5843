//! tokenkeep - client-side session lifecycle.
//!
//! Keeps a short-lived access token and a longer-lived refresh token for a
//! backend API: acquisition, proactive renewal, agreement between several
//! execution contexts sharing one storage, and transparent renew-and-retry
//! for ordinary API calls.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use tokenkeep_core::{AuthConfig, AuthSession};
//!
//! let session = AuthSession::open(AuthConfig::load()?)?;
//! session.login("admin", "secret", true).await?;
//!
//! let client = session.install(reqwest::Client::new());
//! let stats: serde_json::Value = client.get_json("dashboard/stats/").await?;
//! # let _ = stats;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod telemetry;

pub use api::{ApiError, AuthApi, AuthClient};
pub use auth::{AuthSession, SessionEvent, TokenStore};
pub use config::AuthConfig;
pub use error::AuthError;
pub use models::{BroadcastEvent, BroadcastKind, LoginResponse, TokenKind, TokenPair, User};
pub use storage::{ContextId, CookieJar, Persistence, SharedStorage};
