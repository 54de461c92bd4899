//! Single-flight refresh coordination.
//!
//! Every expired-token failure in the process funnels into one coordinator.
//! The first caller becomes the flight leader and performs the actual
//! refresh call; callers arriving while it is out park a oneshot sender in
//! the waiter queue and suspend. When the flight settles, the one outcome
//! is delivered to the leader and every waiter in arrival order, and the
//! in-flight flag drops. A guard drains the queue even when the leading
//! future is cancelled mid-flight, so the flag can never stick.
//!
//! Each flight is stamped with the store's session era at takeoff. A
//! teardown that lands while the flight is in the air ends that era, and
//! the late outcome is dropped instead of re-opening the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::RefreshError;
use crate::store::{AccessToken, SessionStore, UserProfile};

/// What one successful refresh call yields.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: AccessToken,
    /// Some servers return the user alongside the token; kept when present.
    pub user: Option<UserProfile>,
}

/// Upstream credential exchange.
///
/// Implemented over HTTP by `AuthClient`; tests substitute counting mocks.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self) -> Result<RefreshOutcome, RefreshError>;
}

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    /// Parked callers, in arrival order. Non-empty only while in flight.
    waiters: Vec<oneshot::Sender<Result<AccessToken, RefreshError>>>,
}

/// Coalesces concurrent refresh demands onto a single upstream call.
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    transport: Arc<dyn RefreshTransport>,
    state: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<SessionStore>, transport: Arc<dyn RefreshTransport>) -> Self {
        Self {
            store,
            transport,
            state: Mutex::new(FlightState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtains a fresh access token.
    ///
    /// At most one upstream call is in flight at any time; callers that
    /// arrive while one is out suspend until its outcome and share it.
    /// On success the store already holds the new token when this returns.
    pub async fn refresh(&self) -> Result<AccessToken, RefreshError> {
        let wait = {
            let mut state = self.state();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                tracing::debug!(waiters = state.waiters.len(), "refresh in flight, parking caller");
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        match wait {
            Some(rx) => match rx.await {
                Ok(outcome) => outcome,
                // Sender dropped without a settle; the flight vanished.
                Err(_) => Err(RefreshError::Interrupted),
            },
            None => self.lead().await,
        }
    }

    /// Runs the flight as its leader.
    async fn lead(&self) -> Result<AccessToken, RefreshError> {
        let mut guard = SettleGuard {
            coordinator: self,
            settled: false,
        };

        // The outcome may only land in the era the flight started in.
        let epoch = self.store.epoch();

        tracing::debug!("refreshing access token");
        let result = match self.transport.refresh().await {
            Ok(outcome) => {
                let token = outcome.access_token.clone();
                if self
                    .store
                    .install_refresh(outcome.access_token, outcome.user, epoch)
                {
                    tracing::debug!("access token refreshed");
                    Ok(token)
                } else {
                    tracing::debug!("session ended mid-flight, refresh outcome dropped");
                    Err(RefreshError::Interrupted)
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                Err(err)
            }
        };

        guard.settle(result.clone());
        result
    }

    /// Delivers `result` to every parked waiter and clears the flag.
    fn drain(&self, result: Result<AccessToken, RefreshError>) {
        let waiters = {
            let mut state = self.state();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        if !waiters.is_empty() {
            tracing::debug!(
                waiters = waiters.len(),
                ok = result.is_ok(),
                "settling refresh waiters"
            );
        }
        for tx in waiters {
            // A waiter that stopped listening is fine to miss.
            let _ = tx.send(result.clone());
        }
    }
}

/// Settles the flight exactly once.
///
/// The normal path calls `settle` with the real outcome. If the leading
/// future is dropped before that, `Drop` drains the queue with
/// `Interrupted` so no waiter hangs and the next caller can lead a new
/// flight.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, result: Result<AccessToken, RefreshError>) {
        self.settled = true;
        self.coordinator.drain(result);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.drain(Err(RefreshError::Interrupted));
        }
    }
}
