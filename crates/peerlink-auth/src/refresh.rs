//! Single-flight token refresh
//!
//! Concurrent authorization failures must produce exactly one refresh call:
//! the backend rotates refresh tokens, so a second concurrent refresh with
//! the same token would be rejected and log the user out.
//!
//! The first caller moves the coordinator from `Idle` to `Refreshing` and
//! spawns the refresh cycle; every caller (including the first) waits on a
//! oneshot. When the cycle settles, the state returns to `Idle` and every
//! waiter receives the same outcome. The cycle runs on its own task, so a
//! caller that gives up does not cancel it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::{Error, Result};
use crate::issuer::TokenIssuer;
use crate::metrics::record_refresh;

type Outcome = Result<CredentialPair>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<Outcome>>,
    },
}

/// Coordinates refreshes of the credential pair held by a `CredentialStore`.
///
/// Clone is cheap; clones share the same in-flight state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: CredentialStore,
    issuer: Arc<dyn TokenIssuer>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(store: CredentialStore, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                issuer,
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Whether a refresh cycle is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Refresh the credential pair, joining the in-flight cycle if any.
    ///
    /// Fails with `NoSession` when no refresh token is stored and with
    /// `RefreshFailed` when the issuer rejects or is unreachable (the store
    /// is cleared in that case).
    pub async fn refresh(&self) -> Result<CredentialPair> {
        self.join(None).await
    }

    /// Refresh after a call made with `used_access` was rejected.
    ///
    /// If the store already holds a different pair, an earlier cycle (or a
    /// new login) has replaced the token that failed; that pair is returned
    /// without contacting the issuer.
    pub async fn refresh_stale(&self, used_access: Option<&str>) -> Result<CredentialPair> {
        self.join(Some(used_access)).await
    }

    async fn join(&self, used_access: Option<Option<&str>>) -> Result<CredentialPair> {
        let waiter = {
            let mut state = self.inner.lock_state();
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    debug!(queued = waiters.len(), "refresh in flight, waiting for it");
                    waiters.push(tx);
                }
                RefreshState::Idle => {
                    if let (Some(used), Some(current)) = (used_access, self.inner.store.get()) {
                        if Some(current.access()) != used {
                            debug!("credentials already rotated, skipping refresh");
                            return Ok(current);
                        }
                    }
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move { inner.run_cycle().await });
                }
            }
            rx
        };

        waiter.await.unwrap_or_else(|_| {
            Err(Error::RefreshFailed(
                "refresh cycle ended without a result".into(),
            ))
        })
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_cycle(self: Arc<Self>) {
        let mut settle = SettleOnDrop {
            inner: &self,
            done: false,
        };
        let outcome = self.perform().await;
        settle.finish(outcome);
    }

    async fn perform(&self) -> Outcome {
        let snapshot = self.store.snapshot();
        let Some(current) = snapshot.pair else {
            info!("refresh requested without a stored session");
            record_refresh("no_session");
            return Err(Error::NoSession);
        };

        debug!(generation = snapshot.generation, "refreshing credentials");
        match self.issuer.refresh(current.refresh()).await {
            Ok(pair) => {
                if self.store.replace_if(snapshot.generation, Some(pair.clone())) {
                    info!("credentials refreshed");
                    record_refresh("success");
                    return Ok(pair);
                }
                // A login or boundary push landed while the call was in
                // flight; the newer value wins.
                record_refresh("superseded");
                match self.store.get() {
                    Some(newer) => {
                        info!("credentials replaced during refresh, keeping newer pair");
                        Ok(newer)
                    }
                    None => Err(Error::NoSession),
                }
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing session");
                if !self.store.replace_if(snapshot.generation, None) {
                    debug!("credentials replaced during failed refresh, not clearing");
                }
                record_refresh("rejected");
                Err(Error::RefreshFailed(e.to_string()))
            }
        }
    }

    /// Return to `Idle` and hand the outcome to every queued caller.
    fn settle(&self, outcome: Outcome) {
        let waiters = match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh cycle settled");
        for waiter in waiters {
            // A waiter that went away just doesn't get the result
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Guarantees the state returns to `Idle` even if the cycle task is torn
/// down before it finishes (runtime shutdown, panic in the issuer).
struct SettleOnDrop<'a> {
    inner: &'a Inner,
    done: bool,
}

impl SettleOnDrop<'_> {
    fn finish(&mut self, outcome: Outcome) {
        self.done = true;
        self.inner.settle(outcome);
    }
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.inner
                .settle(Err(Error::RefreshFailed("refresh cycle aborted".into())));
        }
    }
}
