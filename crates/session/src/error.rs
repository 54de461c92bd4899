//! Session and request error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable auth error codes carried in 401 response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    /// The bearer token presented with the request has expired.
    AccessTokenExpired,
    /// The server-held refresh credential has expired.
    RefreshTokenExpired,
    /// No refresh credential accompanied the call.
    RefreshTokenMissing,
    /// Any code this library does not recognise.
    #[serde(other)]
    Unknown,
}

impl AuthErrorCode {
    /// Codes that mean the refresh credential itself is gone.
    pub fn is_refresh_terminal(&self) -> bool {
        matches!(
            self,
            AuthErrorCode::RefreshTokenExpired | AuthErrorCode::RefreshTokenMissing
        )
    }
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            AuthErrorCode::AccessTokenExpired => "ACCESS_TOKEN_EXPIRED",
            AuthErrorCode::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AuthErrorCode::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            AuthErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(code)
    }
}

/// Error envelope the clinic API attaches to non-success responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<AuthErrorCode>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Errors surfaced to callers of the request pipeline.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was aborted because the session was torn down.
    #[error("Request cancelled by logout")]
    Cancelled,

    /// Token refresh failed; the caller must authenticate again.
    #[error("Session expired")]
    SessionExpired,

    /// Non-success HTTP status that recovery did not consume.
    #[error("Server returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        code: Option<AuthErrorCode>,
        message: String,
    },

    /// Transport-level failure: DNS, connect, TLS, timeout, body read.
    #[error("HTTP error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// HTTP status for `Status` errors, `None` for everything else.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Outcome of a failed refresh attempt. `Clone` so one verdict can settle
/// every queued waiter.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The server rejected the refresh credential.
    #[error("Refresh rejected: {code}")]
    Rejected { code: AuthErrorCode },

    /// The refresh call never reached a verdict.
    #[error("Refresh transport error: {0}")]
    Transport(String),

    /// The flight leading the refresh was dropped before settling.
    #[error("Refresh interrupted before completion")]
    Interrupted,
}

impl From<reqwest::Error> for RefreshError {
    fn from(e: reqwest::Error) -> Self {
        RefreshError::Transport(e.to_string())
    }
}
