//! Logout sequencing, idempotency and request cancellation.

mod support;

use std::time::Duration;

use clinica_session::{AuthStatus, LogoutReason};
use support::{login_as_amara, session_for, spawn_backend};

#[tokio::test]
async fn test_logout_tears_down_and_redirects() {
    let backend = spawn_backend().await;
    let (session, navigator) = session_for(&backend);
    login_as_amara(&session).await;

    session.logout(LogoutReason::UserRequested).await;

    assert_eq!(backend.clinic.logout_calls(), 1);
    let snapshot = session.store().snapshot();
    assert_eq!(snapshot.auth_status, AuthStatus::Unauthenticated);
    assert!(snapshot.access_token.is_none());
    assert!(snapshot.user.is_none());
    assert_eq!(navigator.last().unwrap().as_path(), "/acme/login");
}

#[tokio::test]
async fn test_repeated_logout_redirects_only() {
    let backend = spawn_backend().await;
    let (session, navigator) = session_for(&backend);
    login_as_amara(&session).await;

    session.logout(LogoutReason::UserRequested).await;
    session.logout(LogoutReason::UserRequested).await;
    session.logout(LogoutReason::SessionExpired).await;

    // The server was told once; every call still lands on login.
    assert_eq!(backend.clinic.logout_calls(), 1);
    assert_eq!(navigator.targets().len(), 3);
    assert!(navigator
        .targets()
        .iter()
        .all(|t| t.as_path() == "/acme/login"));
}

#[tokio::test]
async fn test_logout_cancels_in_flight_requests() {
    let backend = spawn_backend().await;
    let (session, _navigator) = session_for(&backend);
    login_as_amara(&session).await;

    let slow_call = {
        let client = session.client().clone();
        tokio::spawn(async move { client.get("/slow").await })
    };
    // Let the request reach the server before pulling the plug.
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.logout(LogoutReason::UserRequested).await;

    let err = slow_call.await.unwrap().expect_err("request outlived its session");
    assert!(err.is_cancelled(), "got {err}");
}

#[tokio::test]
async fn test_logout_during_refresh_stays_signed_out() {
    let backend = spawn_backend().await;
    let (session, navigator) = session_for(&backend);
    let token = login_as_amara(&session).await;
    backend.clinic.expire(&token);

    // The 401 leads a refresh; the mock holds the flight long enough for
    // the logout to finish first.
    let request = {
        let client = session.client().clone();
        tokio::spawn(async move { client.get("/patients").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.logout(LogoutReason::UserRequested).await;
    assert_eq!(backend.clinic.refresh_calls(), 1);
    assert_eq!(backend.clinic.logout_calls(), 1);

    let err = request.await.unwrap().expect_err("session ended mid-refresh");
    assert!(err.is_cancelled(), "got {err}");

    // The flight settled after the teardown; its outcome must not have
    // signed the session back in.
    let snapshot = session.store().snapshot();
    assert_eq!(snapshot.auth_status, AuthStatus::Unauthenticated);
    assert!(snapshot.access_token.is_none());
    assert!(snapshot.user.is_none());
    assert_eq!(navigator.last().unwrap().as_path(), "/acme/login");
}

#[tokio::test]
async fn test_requests_after_logout_run_under_a_fresh_scope() {
    let backend = spawn_backend().await;
    let (session, _navigator) = session_for(&backend);
    login_as_amara(&session).await;
    session.logout(LogoutReason::UserRequested).await;

    // A new identity signs in; its requests are not poisoned by the old
    // session's cancellation.
    let token = login_as_amara(&session).await;
    let response = session.client().get("/patients").await.expect("fresh session works");
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["bearer"], serde_json::Value::String(token));
}

#[tokio::test]
async fn test_logout_survives_server_failure() {
    let backend = spawn_backend().await;
    let (session, navigator) = session_for(&backend);
    login_as_amara(&session).await;
    backend.clinic.set_logout_fails(true);

    session.logout(LogoutReason::UserRequested).await;

    // Local teardown does not hinge on the server's cooperation.
    assert_eq!(backend.clinic.logout_calls(), 1);
    assert_eq!(session.store().auth_status(), AuthStatus::Unauthenticated);
    assert_eq!(navigator.last().unwrap().as_path(), "/acme/login");
}
