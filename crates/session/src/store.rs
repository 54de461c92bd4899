//! In-memory session state.
//!
//! The store is the single holder of the access token, the signed-in user
//! and the tri-state auth status. Mutations are plain memory writes with no
//! await points, so readers always observe a consistent pair of token and
//! status. Nothing here ever touches durable storage.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// Opaque bearer token for the current session.
///
/// `Debug` is redacted so tokens can never leak through logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token value, for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"<redacted>").finish()
    }
}

/// Signed-in user as the clinic API reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Where the session stands with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// Process start, before bootstrap has settled. Guards hold rendering.
    #[default]
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Consistent point-in-time view of the store.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub access_token: Option<AccessToken>,
    pub user: Option<UserProfile>,
    pub auth_status: AuthStatus,
}

#[derive(Debug, Default)]
struct StoreState {
    access_token: Option<AccessToken>,
    user: Option<UserProfile>,
    auth_status: AuthStatus,
    /// Session era, bumped by every `mark_unauthenticated`. Refresh flights
    /// are stamped with it so a late outcome cannot land in a later era.
    epoch: u64,
}

/// Shared session state. Cheap to clone behind an `Arc`; every consumer in
/// the process sees the same single identity.
#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<StoreState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.read().access_token.clone()
    }

    /// Installs a fresh token and flips the session to `Authenticated`,
    /// atomically. Readers never see the new token with a stale status.
    pub fn set_access_token(&self, token: AccessToken) {
        let mut state = self.write();
        state.access_token = Some(token);
        state.auth_status = AuthStatus::Authenticated;
    }

    /// Drops the in-memory token without deciding the session's fate.
    ///
    /// Status is deliberately left untouched: an in-flight refresh may still
    /// restore the session. Only `mark_unauthenticated` ends it.
    pub fn clear_access_token(&self) {
        self.write().access_token = None;
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.read().auth_status
    }

    /// Terminal transition: token and user leave together, status becomes
    /// `Unauthenticated` and the session era ends. A refresh flight still
    /// in the air belongs to the old era; its outcome will be dropped.
    pub fn mark_unauthenticated(&self) {
        let mut state = self.write();
        state.access_token = None;
        state.user = None;
        state.auth_status = AuthStatus::Unauthenticated;
        state.epoch += 1;
    }

    /// Era stamp for refresh flights; see `install_refresh`.
    pub(crate) fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Installs a refresh outcome, if the session it was started for is
    /// still the live one.
    ///
    /// Checked under the store lock: an outcome stamped with an older era,
    /// or arriving after the session was decided against, is dropped and
    /// `false` comes back. Refresh restores sessions, it never creates
    /// them; a login installs through `set_access_token` instead.
    pub(crate) fn install_refresh(
        &self,
        token: AccessToken,
        user: Option<UserProfile>,
        epoch: u64,
    ) -> bool {
        let mut state = self.write();
        if state.epoch != epoch || state.auth_status == AuthStatus::Unauthenticated {
            return false;
        }
        state.access_token = Some(token);
        if let Some(user) = user {
            state.user = Some(user);
        }
        state.auth_status = AuthStatus::Authenticated;
        true
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn set_user(&self, user: UserProfile) {
        self.write().user = Some(user);
    }

    pub fn clear_user(&self) {
        self.write().user = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            access_token: state.access_token.clone(),
            user: state.user.clone(),
            auth_status: state.auth_status,
        }
    }
}
