//! Session configuration.

use std::time::Duration;

/// Configuration for a session context.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the clinic API, without a trailing slash.
    pub base_url: String,

    /// Tenant slug the session is scoped to, when known up front.
    pub tenant: Option<String>,

    /// Timeout applied to regular API requests.
    pub request_timeout: Duration,

    /// Timeout applied to auth traffic (refresh, logout).
    pub auth_timeout: Duration,
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("CLINICA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let tenant = std::env::var("CLINICA_TENANT")
            .ok()
            .filter(|t| !t.is_empty());

        let request_secs: u64 = std::env::var("CLINICA_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let auth_secs: u64 = std::env::var("CLINICA_AUTH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant,
            request_timeout: Duration::from_secs(request_secs),
            auth_timeout: Duration::from_secs(auth_secs),
        }
    }

    /// Configuration pointed at `base_url` with defaults for the rest.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            tenant: None,
            request_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
        }
    }
}
