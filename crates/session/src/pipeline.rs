//! Request decoration and failure recovery stages.
//!
//! The pipeline has two interception points. Decoration stages mutate an
//! `ApiRequest` before dispatch; recovery stages inspect a failed dispatch
//! and may ask for one replay. `ExpiredTokenRecovery` is the stage that
//! turns a 401 with an expired access token into a coordinated refresh
//! followed by a replay, and a dead refresh credential into a forced
//! logout.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ApiRequest;
use crate::error::{ApiError, AuthErrorCode, RefreshError};
use crate::refresh::RefreshCoordinator;
use crate::session::LogoutReason;
use crate::store::{AuthStatus, SessionStore};

/// Paths served by the auth subsystem itself. Requests whose path contains
/// one of these markers never carry a bearer header, and expiry recovery
/// never applies to them; their 401s mean what they say.
const AUTH_PATH_MARKERS: [&str; 4] = [
    "/auth/login",
    "/auth/refresh",
    "/auth/logout",
    "/tenant/register",
];

pub(crate) fn is_auth_path(path: &str) -> bool {
    AUTH_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}

/// Mutates a request before dispatch. Stages run in registration order on
/// every attempt, replays included.
#[async_trait]
pub trait RequestStage: Send + Sync {
    async fn decorate(&self, request: &mut ApiRequest);
}

/// Attaches `Authorization: Bearer <token>` from the session store.
pub struct BearerAuth {
    store: Arc<SessionStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestStage for BearerAuth {
    async fn decorate(&self, request: &mut ApiRequest) {
        if is_auth_path(request.path()) {
            return;
        }
        if let Some(token) = self.store.access_token() {
            request.set_header("Authorization", format!("Bearer {}", token.expose()));
        }
    }
}

/// Verdict of a recovery stage for one failed dispatch.
pub enum Recovery {
    /// Dispatch the original request once more.
    Retry,
    /// Surface this error to the caller.
    Fail(ApiError),
}

/// Inspects a failed dispatch. `attempt` is 0 for the first dispatch of a
/// request; stages must bound their own retries with it.
#[async_trait]
pub trait RecoveryStage: Send + Sync {
    async fn recover(&self, request: &ApiRequest, error: ApiError, attempt: u32) -> Recovery;
}

/// Teardown hook pulled when the session is beyond recovery. Implemented by
/// the session's logout flow; idempotent by contract.
#[async_trait]
pub trait SessionTeardown: Send + Sync {
    async fn force_logout(&self, reason: LogoutReason);
}

/// The expired-token recovery stage.
///
/// Exactly one replay per request: a request that comes back 401 with
/// `ACCESS_TOKEN_EXPIRED` a second time surfaces its error untouched, the
/// same as any other unhandled status.
pub struct ExpiredTokenRecovery {
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    teardown: Arc<dyn SessionTeardown>,
}

impl ExpiredTokenRecovery {
    pub fn new(
        store: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        teardown: Arc<dyn SessionTeardown>,
    ) -> Self {
        Self {
            store,
            coordinator,
            teardown,
        }
    }
}

#[async_trait]
impl RecoveryStage for ExpiredTokenRecovery {
    async fn recover(&self, request: &ApiRequest, error: ApiError, attempt: u32) -> Recovery {
        // Cancelled requests belong to a torn-down session; nothing to save.
        if error.is_cancelled() {
            return Recovery::Fail(error);
        }

        let (status, code) = match &error {
            ApiError::Status { status, code, .. } => (*status, *code),
            _ => return Recovery::Fail(error),
        };
        if status != reqwest::StatusCode::UNAUTHORIZED {
            return Recovery::Fail(error);
        }
        let Some(code) = code else {
            return Recovery::Fail(error);
        };
        // The auth endpoints answer for themselves.
        if is_auth_path(request.path()) {
            return Recovery::Fail(error);
        }

        match code {
            AuthErrorCode::AccessTokenExpired => {
                if attempt > 0 {
                    // Already replayed once with a fresh token.
                    return Recovery::Fail(error);
                }
                if self.store.auth_status() != AuthStatus::Authenticated {
                    // No live session to refresh for.
                    tracing::debug!(path = %request.path(), "expired token without a live session");
                    return Recovery::Fail(ApiError::SessionExpired);
                }
                match self.coordinator.refresh().await {
                    Ok(_) => Recovery::Retry,
                    Err(RefreshError::Interrupted) => Recovery::Fail(ApiError::Cancelled),
                    Err(RefreshError::Rejected { code }) => {
                        tracing::debug!(code = %code, "refresh rejected, tearing session down");
                        self.teardown.force_logout(LogoutReason::SessionExpired).await;
                        Recovery::Fail(ApiError::SessionExpired)
                    }
                    Err(RefreshError::Transport(detail)) => {
                        tracing::warn!(error = %detail, "refresh unreachable, tearing session down");
                        self.teardown.force_logout(LogoutReason::RefreshFailed).await;
                        Recovery::Fail(ApiError::Network(format!("token refresh failed: {detail}")))
                    }
                }
            }
            AuthErrorCode::RefreshTokenExpired | AuthErrorCode::RefreshTokenMissing => {
                self.teardown.force_logout(LogoutReason::SessionExpired).await;
                Recovery::Fail(ApiError::SessionExpired)
            }
            AuthErrorCode::Unknown => Recovery::Fail(error),
        }
    }
}
