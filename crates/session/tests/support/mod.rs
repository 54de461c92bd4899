//! Shared mock clinic backend for integration tests.
//!
//! A small axum app served on an ephemeral port. It issues numbered access
//! tokens (`token-1`, `token-2`, ...), hands out a refresh cookie on login
//! and checks it on refresh, and counts the calls the session core makes so
//! tests can assert on single-flight behavior and side-effect counts.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use clinica_session::{
    AccessToken, Navigator, RecordingNavigator, Session, SessionConfig, UserProfile,
};

/// How the mock answers `/auth/refresh` when the cookie is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Succeed,
    RejectExpired,
}

pub struct MockClinic {
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    tenant_checks: AtomicUsize,
    refresh_mode: Mutex<RefreshMode>,
    expired: Mutex<HashSet<String>>,
    decorated_auth_seen: AtomicBool,
    logout_fails: AtomicBool,
    valid_tenants: HashSet<String>,
}

impl MockClinic {
    fn new(valid_tenants: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            tenant_checks: AtomicUsize::new(0),
            refresh_mode: Mutex::new(RefreshMode::Succeed),
            expired: Mutex::new(HashSet::new()),
            decorated_auth_seen: AtomicBool::new(false),
            logout_fails: AtomicBool::new(false),
            valid_tenants: valid_tenants.into_iter().map(String::from).collect(),
        }
    }

    fn issue(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        format!("token-{n}")
    }

    /// Marks a token as expired; `/patients` will 401 it from now on.
    pub fn expire(&self, token: &str) {
        self.expired.lock().unwrap().insert(token.to_string());
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.refresh_mode.lock().unwrap() = mode;
    }

    pub fn set_logout_fails(&self, fails: bool) {
        self.logout_fails.store(fails, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn tenant_checks(&self) -> usize {
        self.tenant_checks.load(Ordering::SeqCst)
    }

    /// True if any auth-family request ever carried an Authorization header.
    pub fn decorated_auth_seen(&self) -> bool {
        self.decorated_auth_seen.load(Ordering::SeqCst)
    }

    fn note_auth_request(&self, headers: &HeaderMap) {
        if headers.contains_key(header::AUTHORIZATION) {
            self.decorated_auth_seen.store(true, Ordering::SeqCst);
        }
    }

    fn has_refresh_cookie(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("clinica_refresh="))
            .unwrap_or(false)
    }

    fn is_expired(&self, token: &str) -> bool {
        self.expired.lock().unwrap().contains(token)
    }
}

fn mock_user() -> Value {
    json!({
        "name": "Dr. Amara Okafor",
        "email": "amara@mercy.clinic",
        "role": "physician"
    })
}

async fn login(
    State(clinic): State<Arc<MockClinic>>,
    headers: HeaderMap,
    Json(_credentials): Json<Value>,
) -> Response {
    clinic.note_auth_request(&headers);
    let token = clinic.issue();
    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            "clinica_refresh=rt-1; Path=/; HttpOnly",
        )],
        Json(json!({ "accessToken": token, "user": mock_user() })),
    )
        .into_response()
}

async fn refresh(State(clinic): State<Arc<MockClinic>>, headers: HeaderMap) -> Response {
    clinic.note_auth_request(&headers);
    clinic.refresh_calls.fetch_add(1, Ordering::SeqCst);
    // Long enough for every concurrent expiry to queue behind one flight.
    tokio::time::sleep(Duration::from_millis(60)).await;

    if !clinic.has_refresh_cookie(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "REFRESH_TOKEN_MISSING" })),
        )
            .into_response();
    }

    match *clinic.refresh_mode.lock().unwrap() {
        RefreshMode::RejectExpired => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "REFRESH_TOKEN_EXPIRED" })),
        )
            .into_response(),
        RefreshMode::Succeed => {
            let token = clinic.issue();
            Json(json!({ "accessToken": token, "user": mock_user() })).into_response()
        }
    }
}

async fn logout(State(clinic): State<Arc<MockClinic>>, headers: HeaderMap) -> Response {
    clinic.note_auth_request(&headers);
    clinic.logout_calls.fetch_add(1, Ordering::SeqCst);
    if clinic.logout_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "session service unavailable" })),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn patients(State(clinic): State<Arc<MockClinic>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "missing bearer" })),
        )
            .into_response();
    };
    if clinic.is_expired(token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "ACCESS_TOKEN_EXPIRED", "message": "access token expired" })),
        )
            .into_response();
    }
    Json(json!({
        "bearer": token,
        "patients": [ { "id": 1, "name": "N. Adeyemi" }, { "id": 2, "name": "P. Kowalski" } ]
    }))
    .into_response()
}

/// Slow protected endpoint, for racing logout against in-flight requests.
async fn slow(State(clinic): State<Arc<MockClinic>>, headers: HeaderMap) -> Response {
    tokio::time::sleep(Duration::from_millis(500)).await;
    patients(State(clinic), headers).await
}

async fn validate_tenant(
    State(clinic): State<Arc<MockClinic>>,
    Path(slug): Path<String>,
) -> Response {
    clinic.tenant_checks.fetch_add(1, Ordering::SeqCst);
    if slug == "boom" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "tenant service unavailable" })),
        )
            .into_response();
    }
    Json(json!({ "valid": clinic.valid_tenants.contains(&slug) })).into_response()
}

fn router(clinic: Arc<MockClinic>) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/patients", get(patients))
        .route("/slow", get(slow))
        .route("/{slug}/tenant/validate", get(validate_tenant))
        .with_state(clinic)
}

pub struct TestBackend {
    pub clinic: Arc<MockClinic>,
    pub base_url: String,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn spawn_backend() -> TestBackend {
    let clinic = Arc::new(MockClinic::new(["acme", "mercy"]));
    let app = router(clinic.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock listener");
    let addr = listener.local_addr().expect("failed to get mock addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server failed");
    });

    TestBackend {
        clinic,
        base_url: format!("http://{addr}"),
        server,
    }
}

/// Session wired to the mock backend, with a recording navigator.
pub fn session_for(backend: &TestBackend) -> (Arc<Session>, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::new());
    let config = SessionConfig::with_base_url(&backend.base_url).with_tenant("acme");
    let session =
        Session::new(config, navigator.clone() as Arc<dyn Navigator>).expect("session build");
    (Arc::new(session), navigator)
}

/// Signs in through the allow-listed login endpoint and installs the
/// returned token and user, the way a login screen would. Returns the
/// access token value.
pub async fn login_as_amara(session: &Session) -> String {
    let response = seed_refresh_cookie(session).await;
    let token = response["accessToken"]
        .as_str()
        .expect("login token")
        .to_string();
    session
        .store()
        .set_access_token(AccessToken::new(token.clone()));
    let user: UserProfile =
        serde_json::from_value(response["user"].clone()).expect("login user");
    session.store().set_user(user);
    token
}

/// Calls login for its `Set-Cookie` side effect only; the store stays
/// untouched, as if the process restarted with the cookie still alive.
pub async fn seed_refresh_cookie(session: &Session) -> Value {
    let response = session
        .client()
        .post(
            "/auth/login",
            &json!({ "email": "amara@mercy.clinic", "password": "correct-horse" }),
        )
        .await
        .expect("login call");
    assert_eq!(response.status().as_u16(), 200);
    response.json().expect("login body")
}
