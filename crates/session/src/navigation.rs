//! Navigation seam between the session core and the host application.
//!
//! The core never renders anything. When a guard or a logout decides the
//! user has to move, it hands a typed target to the host's `Navigator`.

use std::sync::{Mutex, PoisonError};

/// Destination the session core can steer the host toward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Tenant-scoped login screen.
    Login { tenant: Option<String> },
    /// Tenant landing page, for visitors who are already signed in.
    Landing { tenant: Option<String> },
    /// Tenant registration flow, for paths with no valid slug.
    Registration,
}

impl RedirectTarget {
    /// Path rendering for hosts that navigate by URL.
    pub fn as_path(&self) -> String {
        match self {
            RedirectTarget::Login { tenant: Some(t) } => format!("/{t}/login"),
            RedirectTarget::Login { tenant: None } => "/login".to_string(),
            RedirectTarget::Landing { tenant: Some(t) } => format!("/{t}"),
            RedirectTarget::Landing { tenant: None } => "/".to_string(),
            RedirectTarget::Registration => "/register".to_string(),
        }
    }
}

/// Host-provided navigation sink.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: RedirectTarget);
}

/// Navigator that drops redirects. For headless consumers that only
/// inspect decisions.
#[derive(Debug, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _target: RedirectTarget) {}
}

/// Navigator that records every redirect for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<RedirectTarget>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> Vec<RedirectTarget> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<RedirectTarget> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: RedirectTarget) {
        tracing::debug!(path = %target.as_path(), "redirect recorded");
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target);
    }
}
