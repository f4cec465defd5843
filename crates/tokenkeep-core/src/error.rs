use thiserror::Error;

use crate::api::ApiError;

/// Session-level failures surfaced by `AuthSession`.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The backend rejected the username/password exchange.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The refresh token was rejected; the session has been logged out.
    #[error("Refresh token rejected - session ended")]
    RefreshFailed,

    /// The network failed while renewing; treated like a rejected refresh.
    #[error("Network failure during token renewal: {0}")]
    TransientNetworkFailure(#[source] ApiError),

    /// There is no refresh token to renew with.
    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Classify a failed renewal call.
    pub(crate) fn from_refresh_failure(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(_) => AuthError::TransientNetworkFailure(err),
            _ => AuthError::RefreshFailed,
        }
    }

    /// Classify a failed credential exchange. Only a rejection by the backend
    /// counts as bad credentials; an unreadable success is a protocol failure.
    pub(crate) fn from_login_failure(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::BadRequest(_) => AuthError::InvalidCredentials,
            other => AuthError::Api(other),
        }
    }
}
