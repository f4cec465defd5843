//! Client for the authentication backend.
//!
//! This module provides the `AuthApi` struct for exchanging credentials for a
//! token pair, renewing the access token and fetching the user profile.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::models::{TokenPair, User};

use super::{join_url, ApiError};

const TOKEN_PATH: &str = "token/";
const REFRESH_PATH: &str = "token/refresh/";
const USER_PATH: &str = "auth/user/";

#[derive(Debug, Serialize)]
struct CredentialsRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Authentication backend client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(config: &AuthConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.api_url))
    }

    /// Use an existing client, sharing its connection pool.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// Exchange username and password for a fresh token pair.
    pub async fn obtain_pair(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = join_url(&self.base_url, TOKEN_PATH);
        debug!(username, "Requesting token pair");

        let response = self
            .client
            .post(&url)
            .json(&CredentialsRequest { username, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("token response: {}", e)))
    }

    /// Mint a new access token from a refresh token.
    pub async fn refresh_access(&self, refresh: &str) -> Result<String, ApiError> {
        let url = join_url(&self.base_url, REFRESH_PATH);

        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("refresh response: {}", e)))?;
        Ok(body.access)
    }

    pub async fn fetch_user(&self, access: &str) -> Result<User, ApiError> {
        let url = join_url(&self.base_url, USER_PATH);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("user response: {}", e)))
    }

    /// Check if response is successful, returning an error with body if not.
    pub(crate) async fn check_response(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refresh_response_ignores_rotated_refresh() {
        let json = r#"{"access": "new-access", "refresh": "rotated"}"#;
        let body: RefreshResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(body.access, "new-access");
    }

    #[test]
    fn test_parse_token_pair_response() {
        let json = r#"{"access": "a", "refresh": "r"}"#;
        let pair: TokenPair = serde_json::from_str(json).expect("parse");
        assert_eq!(pair, TokenPair::new("a", "r"));
    }

    #[test]
    fn test_credentials_request_shape() {
        let body = serde_json::to_value(CredentialsRequest {
            username: "admin",
            password: "secret",
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"username": "admin", "password": "secret"}));
    }
}
