//! Route guard decisions.
//!
//! Guards are pure: given the current auth status (and, for the tenant
//! guard, the memoised validity) they say what the host should do with a
//! route. `Session` pairs them with bootstrap and tenant validation for
//! the async resolved forms.
//!
//! Fail-closed throughout: nothing protected renders while state is still
//! settling, and an unproven tenant never renders at all.

use crate::navigation::RedirectTarget;
use crate::store::AuthStatus;
use crate::tenant::{self, TenantValidity};

/// What the host should do with the guarded route right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// State is still settling; show a splash, never the content.
    Loading,
    /// Render the guarded content.
    Render,
    /// Leave: the user belongs somewhere else.
    Redirect(RedirectTarget),
}

/// Gate for routes that require a signed-in user.
pub struct ProtectedGuard;

impl ProtectedGuard {
    pub fn decide(status: AuthStatus, tenant: Option<&str>) -> GuardDecision {
        match status {
            AuthStatus::Unknown => GuardDecision::Loading,
            AuthStatus::Authenticated => GuardDecision::Render,
            AuthStatus::Unauthenticated => GuardDecision::Redirect(RedirectTarget::Login {
                tenant: tenant.map(str::to_string),
            }),
        }
    }
}

/// Gate for routes that only make sense signed out, like the login screen.
pub struct PublicGuard;

impl PublicGuard {
    pub fn decide(status: AuthStatus, tenant: Option<&str>) -> GuardDecision {
        match status {
            AuthStatus::Unknown => GuardDecision::Loading,
            AuthStatus::Authenticated => GuardDecision::Redirect(RedirectTarget::Landing {
                tenant: tenant.map(str::to_string),
            }),
            AuthStatus::Unauthenticated => GuardDecision::Render,
        }
    }
}

/// Gate wrapping everything under a tenant path.
pub struct TenantGuard;

impl TenantGuard {
    /// Snapshot decision from the memoised verdict. `Loading` until the
    /// slug has been validated; see `Session::resolve_tenant` for the
    /// resolving form.
    pub fn decide(path: &str, cached: Option<TenantValidity>) -> GuardDecision {
        match tenant::slug_from_path(path) {
            None => GuardDecision::Redirect(RedirectTarget::Registration),
            Some(_) => match cached {
                None | Some(TenantValidity::Pending) => GuardDecision::Loading,
                Some(TenantValidity::Valid) => GuardDecision::Render,
                Some(TenantValidity::Invalid) => {
                    GuardDecision::Redirect(RedirectTarget::Registration)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_guard_table() {
        assert_eq!(
            ProtectedGuard::decide(AuthStatus::Unknown, Some("mercy")),
            GuardDecision::Loading
        );
        assert_eq!(
            ProtectedGuard::decide(AuthStatus::Authenticated, Some("mercy")),
            GuardDecision::Render
        );
        assert_eq!(
            ProtectedGuard::decide(AuthStatus::Unauthenticated, Some("mercy")),
            GuardDecision::Redirect(RedirectTarget::Login {
                tenant: Some("mercy".to_string())
            })
        );
        assert_eq!(
            ProtectedGuard::decide(AuthStatus::Unauthenticated, None),
            GuardDecision::Redirect(RedirectTarget::Login { tenant: None })
        );
    }

    #[test]
    fn test_public_guard_table() {
        assert_eq!(
            PublicGuard::decide(AuthStatus::Unknown, None),
            GuardDecision::Loading
        );
        assert_eq!(
            PublicGuard::decide(AuthStatus::Unauthenticated, None),
            GuardDecision::Render
        );
        // Signed-in visitors skip the login screen entirely.
        assert_eq!(
            PublicGuard::decide(AuthStatus::Authenticated, Some("mercy")),
            GuardDecision::Redirect(RedirectTarget::Landing {
                tenant: Some("mercy".to_string())
            })
        );
    }

    #[test]
    fn test_tenant_guard_table() {
        assert_eq!(
            TenantGuard::decide("/register", None),
            GuardDecision::Redirect(RedirectTarget::Registration)
        );
        assert_eq!(TenantGuard::decide("/mercy/patients", None), GuardDecision::Loading);
        assert_eq!(
            TenantGuard::decide("/mercy/patients", Some(TenantValidity::Pending)),
            GuardDecision::Loading
        );
        assert_eq!(
            TenantGuard::decide("/mercy/patients", Some(TenantValidity::Valid)),
            GuardDecision::Render
        );
        assert_eq!(
            TenantGuard::decide("/mercy/patients", Some(TenantValidity::Invalid)),
            GuardDecision::Redirect(RedirectTarget::Registration)
        );
    }
}
