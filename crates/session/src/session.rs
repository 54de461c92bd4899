//! The session context: construction, bootstrap and logout.
//!
//! `Session` wires the store, the refresh coordinator, the decorated API
//! client and the guards together for one user identity. Hosts construct
//! one `Session` per process and pass it to whatever needs it; nothing in
//! this crate reaches for global state.

use std::sync::Arc;

use crate::auth_client::AuthClient;
use crate::client::{ApiClient, CancelScope};
use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::guard::{GuardDecision, ProtectedGuard, PublicGuard, TenantGuard};
use crate::navigation::{Navigator, RedirectTarget};
use crate::pipeline::{BearerAuth, ExpiredTokenRecovery, SessionTeardown};
use crate::refresh::{RefreshCoordinator, RefreshTransport};
use crate::store::{AuthStatus, SessionStore};
use crate::tenant::{self, TenantValidator, TenantValidity};

use async_trait::async_trait;

/// Why a session ended. Carried into the logs, never onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to leave.
    UserRequested,
    /// The server declared the session over.
    SessionExpired,
    /// The refresh endpoint could not be reached.
    RefreshFailed,
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            LogoutReason::UserRequested => "user_requested",
            LogoutReason::SessionExpired => "session_expired",
            LogoutReason::RefreshFailed => "refresh_failed",
        };
        f.write_str(reason)
    }
}

/// The teardown sequence shared by user-requested logout and forced logout
/// from the recovery stage.
pub(crate) struct LogoutFlow {
    store: Arc<SessionStore>,
    auth: Arc<AuthClient>,
    navigator: Arc<dyn Navigator>,
    cancel: CancelScope,
    tenant: Option<String>,
    /// Serialises teardowns so the side effects run exactly once.
    teardown_lock: tokio::sync::Mutex<()>,
}

impl LogoutFlow {
    /// Idempotent: the first call for a live session runs the whole
    /// sequence; every later call only repeats the redirect.
    async fn run(&self, reason: LogoutReason) {
        let _guard = self.teardown_lock.lock().await;

        if self.store.auth_status() == AuthStatus::Unauthenticated {
            tracing::debug!(reason = %reason, "logout for an already ended session, redirecting only");
            self.navigator.navigate(RedirectTarget::Login {
                tenant: self.tenant.clone(),
            });
            return;
        }

        tracing::info!(reason = %reason, "logging out");
        // Server-side invalidation is best effort; local teardown must not
        // hinge on the network.
        if let Err(err) = self.auth.logout().await {
            tracing::warn!(error = %err, "server-side logout failed, continuing local teardown");
        }
        self.store.mark_unauthenticated();
        self.cancel.rotate();
        self.navigator.navigate(RedirectTarget::Login {
            tenant: self.tenant.clone(),
        });
    }
}

#[async_trait]
impl SessionTeardown for LogoutFlow {
    async fn force_logout(&self, reason: LogoutReason) {
        self.run(reason).await;
    }
}

/// One authenticated session: store, pipeline, refresh and guards behind a
/// single context object.
pub struct Session {
    config: SessionConfig,
    store: Arc<SessionStore>,
    client: Arc<ApiClient>,
    coordinator: Arc<RefreshCoordinator>,
    tenants: TenantValidator,
    logout: Arc<LogoutFlow>,
}

impl Session {
    /// Builds a session against `config.base_url`.
    ///
    /// The underlying HTTP client keeps a cookie jar: the refresh
    /// credential lives there, shared between regular and auth traffic the
    /// way a browser would share it.
    pub fn new(config: SessionConfig, navigator: Arc<dyn Navigator>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        let store = Arc::new(SessionStore::new());
        let cancel = CancelScope::new();
        let auth = Arc::new(AuthClient::new(http.clone(), &config));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            auth.clone() as Arc<dyn RefreshTransport>,
        ));
        let logout = Arc::new(LogoutFlow {
            store: store.clone(),
            auth,
            navigator,
            cancel: cancel.clone(),
            tenant: config.tenant.clone(),
            teardown_lock: tokio::sync::Mutex::new(()),
        });
        let client = Arc::new(
            ApiClient::new(http, &config, cancel)
                .with_stage(Arc::new(BearerAuth::new(store.clone())))
                .with_recovery(Arc::new(ExpiredTokenRecovery::new(
                    store.clone(),
                    coordinator.clone(),
                    logout.clone() as Arc<dyn SessionTeardown>,
                ))),
        );
        let tenants = TenantValidator::new(client.clone());

        Ok(Self {
            config,
            store,
            client,
            coordinator,
            tenants,
            logout,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The decorated client. All regular traffic should go through it.
    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Resolves an `Unknown` session with one silent refresh.
    ///
    /// Safe to call from every mount point: once the status has settled it
    /// returns immediately, and concurrent calls while it is settling share
    /// a single upstream refresh. Failure marks the session
    /// `Unauthenticated` without redirecting; rendering is the guards' call.
    pub async fn bootstrap(&self) -> AuthStatus {
        if self.store.auth_status() != AuthStatus::Unknown {
            return self.store.auth_status();
        }

        tracing::debug!("bootstrapping session from refresh credential");
        match self.coordinator.refresh().await {
            Ok(_) => self.store.auth_status(),
            Err(err) => {
                tracing::debug!(error = %err, "bootstrap refresh failed, session starts signed out");
                self.store.mark_unauthenticated();
                AuthStatus::Unauthenticated
            }
        }
    }

    /// Ends the session. Idempotent; always lands on the login screen.
    pub async fn logout(&self, reason: LogoutReason) {
        self.logout.run(reason).await;
    }

    /// Settled decision for a protected route, bootstrapping if needed.
    pub async fn resolve_protected(&self) -> GuardDecision {
        let status = self.bootstrap().await;
        ProtectedGuard::decide(status, self.config.tenant.as_deref())
    }

    /// Settled decision for a public-only route, bootstrapping if needed.
    pub async fn resolve_public(&self) -> GuardDecision {
        let status = self.bootstrap().await;
        PublicGuard::decide(status, self.config.tenant.as_deref())
    }

    /// Settled decision for a tenant path, validating the slug if needed.
    pub async fn resolve_tenant(&self, path: &str) -> GuardDecision {
        match tenant::slug_from_path(path) {
            None => GuardDecision::Redirect(RedirectTarget::Registration),
            Some(slug) => match self.tenants.validate(slug).await {
                TenantValidity::Valid => GuardDecision::Render,
                TenantValidity::Pending | TenantValidity::Invalid => {
                    GuardDecision::Redirect(RedirectTarget::Registration)
                }
            },
        }
    }

    /// Snapshot decision for a tenant path from the memoised verdict,
    /// without touching the network.
    pub fn decide_tenant(&self, path: &str) -> GuardDecision {
        let cached = tenant::slug_from_path(path).and_then(|slug| self.tenants.cached(slug));
        TenantGuard::decide(path, cached)
    }
}
