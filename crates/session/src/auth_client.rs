//! Plain transport for the auth endpoint family.
//!
//! Auth traffic never goes through the decorated pipeline: no bearer
//! header, no expiry recovery, no session cancellation. The refresh
//! credential rides on the shared cookie jar, and the logout call must
//! survive the very teardown that cancels everything else.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SessionConfig;
use crate::error::{ApiError, AuthErrorCode, ErrorBody, RefreshError};
use crate::refresh::{RefreshOutcome, RefreshTransport};
use crate::store::{AccessToken, UserProfile};

/// Successful refresh response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshReply {
    access_token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

/// HTTP client for `/auth/refresh` and `/auth/logout`.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AuthClient {
    /// `http` must share its cookie jar with the main API client, the way a
    /// browser shares cookies between every request it makes.
    pub fn new(http: reqwest::Client, config: &SessionConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            timeout: config.auth_timeout,
        }
    }

    /// Best-effort server-side session invalidation.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/auth/logout", self.base_url))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(ApiError::Status {
                status,
                code: body.code,
                message: body
                    .message
                    .unwrap_or_else(|| "logout rejected".to_string()),
            });
        }
        tracing::debug!("server-side session invalidated");
        Ok(())
    }
}

#[async_trait]
impl RefreshTransport for AuthClient {
    /// Exchanges the refresh cookie for a new access token.
    async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        let response = self
            .http
            .post(format!("{}/auth/refresh", self.base_url))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let reply: RefreshReply = response.json().await?;
            return Ok(RefreshOutcome {
                access_token: AccessToken::new(reply.access_token),
                user: reply.user,
            });
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let code = body.code.unwrap_or(AuthErrorCode::Unknown);
        tracing::debug!(status = %status, code = %code, "refresh rejected by server");
        Err(RefreshError::Rejected { code })
    }
}
