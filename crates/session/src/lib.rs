//! Clinica Session Core
//!
//! Authenticated-session machinery for multi-tenant clinic frontends.
//!
//! This crate provides:
//! - In-memory session store with a tri-state auth status
//! - Decorated HTTP client with bearer injection and expiry recovery
//! - Single-flight token refresh that coalesces concurrent expiries
//! - Route guards for protected, public-only and tenant-scoped routes
//! - Session bootstrap and idempotent logout
//!
//! A host builds one [`Session`] per process and drives everything through
//! it:
//!
//! ```no_run
//! use std::sync::Arc;
//! use clinica_session::{NoopNavigator, Session, SessionConfig};
//!
//! # async fn run() -> Result<(), clinica_session::ApiError> {
//! let config = SessionConfig::with_base_url("https://api.clinica.test").with_tenant("mercy");
//! let session = Session::new(config, Arc::new(NoopNavigator))?;
//!
//! session.bootstrap().await;
//! let patients = session.client().get("/patients").await?;
//! # let _ = patients;
//! # Ok(())
//! # }
//! ```

pub mod auth_client;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod navigation;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod store;
pub mod tenant;

pub use auth_client::AuthClient;
pub use client::{ApiClient, ApiRequest, ApiResponse, CancelScope};
pub use config::SessionConfig;
pub use error::{ApiError, AuthErrorCode, ErrorBody, RefreshError};
pub use guard::{GuardDecision, ProtectedGuard, PublicGuard, TenantGuard};
pub use navigation::{Navigator, NoopNavigator, RecordingNavigator, RedirectTarget};
pub use pipeline::{
    BearerAuth, ExpiredTokenRecovery, Recovery, RecoveryStage, RequestStage, SessionTeardown,
};
pub use refresh::{RefreshCoordinator, RefreshOutcome, RefreshTransport};
pub use session::{LogoutReason, Session};
pub use store::{AccessToken, AuthStatus, SessionSnapshot, SessionStore, UserProfile};
pub use tenant::{slug_from_path, TenantValidator, TenantValidity};
