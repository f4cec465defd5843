//! Session lifecycle: token storage, proactive renewal and cross-context sync.
//!
//! This module provides:
//! - `TokenStore`: synchronous home of the access/refresh pair, with the
//!   cookie + shared storage `TieredTokenStore` and an in-memory double
//! - `RefreshScheduler`: single-shot timer renewing the access token five
//!   minutes before it expires
//! - `Broadcaster`: login/logout propagation between contexts
//! - `AuthSession`: the facade tying them together

pub mod broadcast;
pub mod scheduler;
pub mod session;
pub mod store;

pub use broadcast::{Broadcaster, SYNC_KEY};
pub use scheduler::{RefreshScheduler, SchedulerState};
pub use session::{AuthSession, SessionEvent};
pub use store::{MemoryTokenStore, TieredTokenStore, TokenStore};
