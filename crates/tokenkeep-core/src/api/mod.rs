//! HTTP side of the session subsystem.
//!
//! This module provides:
//! - `AuthApi`: the three authentication backend endpoints
//!   (`POST /token/`, `POST /token/refresh/`, `GET /auth/user/`)
//! - `AuthClient`: a wrapped `reqwest::Client` that attaches the bearer token
//!   to every call and renews-and-replays once on a 401
//! - `ApiError`: HTTP failures classified by status

pub mod client;
pub mod error;
pub mod interceptor;

pub use client::AuthApi;
pub use error::ApiError;
pub use interceptor::AuthClient;

/// Join an API-relative path onto a base URL, tolerating slashes on either side.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
