//! Tenant slug handling and validation.
//!
//! Every tenant-scoped path starts with the clinic's slug. The validator
//! asks the server whether a slug exists and remembers the verdict for that
//! slug only; navigating to a different tenant drops the memo. Anything
//! short of a definitive "valid" counts as invalid.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;

use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;

/// Path segments that can never be tenant slugs.
const RESERVED_SEGMENTS: [&str; 1] = ["register"];

/// Extracts the tenant slug from a path, if it has one.
pub fn slug_from_path(path: &str) -> Option<&str> {
    let segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
    if segment.is_empty() || RESERVED_SEGMENTS.contains(&segment) {
        return None;
    }
    Some(segment)
}

/// Server verdict on a tenant slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantValidity {
    /// Validation has not settled yet.
    Pending,
    Valid,
    Invalid,
}

#[derive(Debug, Clone)]
struct VerdictMemo {
    slug: String,
    validity: TenantValidity,
}

#[derive(Debug, Deserialize)]
struct ValidateReply {
    valid: bool,
}

/// Validates tenant slugs against the clinic API, one remembered verdict
/// at a time.
pub struct TenantValidator {
    client: Arc<ApiClient>,
    memo: Mutex<Option<VerdictMemo>>,
}

impl TenantValidator {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            memo: Mutex::new(None),
        }
    }

    /// Settled verdict for `slug`, hitting the server on first sight.
    ///
    /// Server verdicts are memoised per slug. A validation that errors out
    /// reports `Invalid` for this call but is not memoised, so a later
    /// visit can try again.
    pub async fn validate(&self, slug: &str) -> TenantValidity {
        if let Some(validity) = self.cached(slug) {
            return validity;
        }

        match self.check(slug).await {
            Ok(valid) => {
                let validity = if valid {
                    TenantValidity::Valid
                } else {
                    TenantValidity::Invalid
                };
                tracing::debug!(slug = %slug, valid, "tenant verdict memoised");
                self.remember(slug, validity);
                validity
            }
            Err(err) => {
                tracing::warn!(slug = %slug, error = %err, "tenant validation failed, treating as invalid");
                TenantValidity::Invalid
            }
        }
    }

    /// Memoised verdict for `slug`, if the last validated slug was this one.
    pub fn cached(&self, slug: &str) -> Option<TenantValidity> {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|memo| memo.slug == slug)
            .map(|memo| memo.validity)
    }

    async fn check(&self, slug: &str) -> Result<bool, ApiError> {
        let response = self
            .client
            .execute(ApiRequest::get(format!("/{slug}/tenant/validate")))
            .await?;
        let reply: ValidateReply = response.json()?;
        Ok(reply.valid)
    }

    fn remember(&self, slug: &str, validity: TenantValidity) {
        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        // A single slot: switching tenants forgets the previous verdict.
        *memo = Some(VerdictMemo {
            slug: slug.to_string(),
            validity,
        });
    }
}
