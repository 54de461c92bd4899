//! HTTP client wrapper.
//!
//! One `ApiClient` carries all regular traffic for a session. Every call
//! runs the decoration stages, dispatches over the shared `reqwest` client
//! and, on failure, consults the recovery stages, which may ask for a
//! single replay. The replay re-runs decoration from the original request,
//! so a refreshed token is picked up naturally.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{ApiError, ErrorBody};
use crate::pipeline::{Recovery, RecoveryStage, RequestStage};

/// Rotating cancellation scope for the current login session.
///
/// Requests capture the token that is current when they start. Logout
/// rotates the scope: everything captured before resolves cancelled, while
/// requests of the next login run under a fresh token.
#[derive(Clone)]
pub struct CancelScope {
    current: Arc<RwLock<CancellationToken>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    /// Token covering requests issued from now until the next rotation.
    pub fn current(&self) -> CancellationToken {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancels everything issued under the current scope and opens a new one.
    pub fn rotate(&self) {
        let old = {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, CancellationToken::new())
        };
        old.cancel();
        tracing::debug!("request cancellation scope rotated");
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

/// One API call, described independently of the transport so it can be
/// decorated, dispatched and replayed.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: reqwest::Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: reqwest::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &reqwest::Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any previous value under the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// Response with the body already read, so it can be decoded more than once
/// and never holds a connection open.
#[derive(Debug)]
pub struct ApiResponse {
    status: reqwest::StatusCode,
    headers: reqwest::header::HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> reqwest::StatusCode {
        self.status
    }

    pub fn headers(&self) -> &reqwest::header::HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Decorated HTTP client for a session.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    stages: Vec<Arc<dyn RequestStage>>,
    recovery: Vec<Arc<dyn RecoveryStage>>,
    cancel: CancelScope,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, config: &SessionConfig, cancel: CancelScope) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
            stages: Vec::new(),
            recovery: Vec::new(),
            cancel,
        }
    }

    /// Appends a decoration stage. Stages run in the order added.
    pub fn with_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a recovery stage. Stages are consulted in the order added.
    pub fn with_recovery(mut self, stage: Arc<dyn RecoveryStage>) -> Self {
        self.recovery.push(stage);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn get_with_query(
        &self,
        path: impl Into<String>,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse, ApiError> {
        let mut request = ApiRequest::get(path);
        for (key, value) in query {
            request = request.with_query(*key, *value);
        }
        self.execute(request).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: impl Into<String>,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let body = serde_json::to_value(body)?;
        self.execute(ApiRequest::post(path).with_body(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: impl Into<String>,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let body = serde_json::to_value(body)?;
        self.execute(ApiRequest::patch(path).with_body(body)).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Runs one request through the full pipeline.
    ///
    /// Decoration stages run before every dispatch, including replays, so a
    /// replayed request reflects the session state of its second attempt,
    /// not its first.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let request_id = Uuid::new_v4();
        let cancel = self.cancel.current();
        let mut attempt: u32 = 0;

        loop {
            let mut decorated = request.clone();
            for stage in &self.stages {
                stage.decorate(&mut decorated).await;
            }

            match self.dispatch(&decorated, &cancel, request_id, attempt).await {
                Ok(response) => return Ok(response),
                // Cancellation is final; recovery never sees it.
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => match self.run_recovery(&decorated, err, attempt).await {
                    Recovery::Retry => {
                        attempt += 1;
                        tracing::debug!(request_id = %request_id, attempt, "replaying request");
                    }
                    Recovery::Fail(err) => return Err(err),
                },
            }
        }
    }

    async fn run_recovery(&self, request: &ApiRequest, error: ApiError, attempt: u32) -> Recovery {
        let mut error = error;
        for stage in &self.recovery {
            match stage.recover(request, error, attempt).await {
                Recovery::Retry => return Recovery::Retry,
                Recovery::Fail(next) => error = next,
            }
        }
        Recovery::Fail(error)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
        request_id: Uuid,
        attempt: u32,
    ) -> Result<ApiResponse, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .timeout(self.request_timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            attempt,
            "dispatching request"
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            result = builder.send() => result?,
        };

        // A logout that landed while the response was in the air wins; the
        // late response must not feed a session that no longer exists.
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let status = response.status();
        if status.is_success() {
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();
            return Ok(ApiResponse {
                status,
                headers,
                body,
            });
        }

        let body = response.bytes().await.unwrap_or_default();
        let parsed: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        tracing::debug!(
            request_id = %request_id,
            status = %status,
            code = ?parsed.code,
            "request failed"
        );
        let message = parsed.message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        Err(ApiError::Status {
            status,
            code: parsed.code,
            message,
        })
    }
}
