//! Authenticated HTTP client wrapper.
//!
//! Every call made through `AuthClient` passes two hooks:
//!
//! 1. **Outbound**: the current access token from the token store is attached
//!    as `Authorization: Bearer ...`; without a token the call goes out
//!    unauthenticated.
//! 2. **Inbound**: a 401 on the first attempt renews the access token through
//!    the session and replays the call once. A second 401, a failed renewal or
//!    a body that cannot be replayed propagates the failure unchanged.
//!
//! The retry budget lives on each call, so concurrent calls each get one.

use reqwest::{header, Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::AuthSession;
use crate::models::TokenKind;

use super::{join_url, ApiError, AuthApi};

/// Per-call retry marker.
#[derive(Debug, Default, Clone, Copy)]
struct CallContext {
    retried: bool,
}

/// `reqwest::Client` wrapped with the session's outbound and inbound hooks.
/// Clone is cheap; clones share the connection pool and the session.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    session: AuthSession,
}

impl AuthClient {
    pub(crate) fn new(http: Client, base_url: &str, session: AuthSession) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            session,
        }
    }

    /// Start a request against a path relative to the API base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, join_url(&self.base_url, path))
    }

    /// Build and send a request through the interceptor.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Send a request, renewing and replaying once on an authentication failure.
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        let mut call = CallContext::default();
        let mut request = request;

        loop {
            // Streaming bodies cannot be cloned and therefore cannot be replayed
            let replay = request.try_clone();
            let url = request.url().clone();

            let response = self.http.execute(self.authorize(request)).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return AuthApi::check_response(response).await;
            }

            if call.retried {
                warn!(url = %url, "Still unauthorized after renewal, giving up");
                return AuthApi::check_response(response).await;
            }
            let Some(next) = replay else {
                debug!(url = %url, "Unauthorized and request body is not replayable");
                return AuthApi::check_response(response).await;
            };
            call.retried = true;

            match self.session.refresh().await {
                Ok(_) => {
                    debug!(url = %url, "Replaying request with renewed token");
                    request = next;
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Renewal failed, propagating 401");
                    return AuthApi::check_response(response).await;
                }
            }
        }
    }

    /// Outbound hook: attach the current access token, or strip a stale one.
    fn authorize(&self, mut request: Request) -> Request {
        let headers = request.headers_mut();
        headers.remove(header::AUTHORIZATION);

        if let Some(token) = self.session.store().get(TokenKind::Access) {
            match header::HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Stored access token is not a valid header value"),
            }
        }
        request
    }

    // ===== Typed helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::parse(response).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::POST, path).json(body)).await?;
        Self::parse(response).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::PUT, path).json(body)).await?;
        Self::parse(response).await
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::PATCH, path).json(body)).await?;
        Self::parse(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().clone();
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }
}
