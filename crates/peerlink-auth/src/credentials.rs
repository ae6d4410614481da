//! In-process credential store
//!
//! Holds the current access/refresh pair for the UI context. This store is the
//! source of truth during normal operation; the privileged host store is a
//! mirror fed by `BoundaryMirror`.
//!
//! State lives in a `tokio::sync::watch` channel: readers always get a whole
//! snapshot, so nobody can observe a new access token next to an old refresh
//! token. Every mutation bumps `generation`, which is what the refresh
//! coordinator uses to avoid overwriting a newer value with a stale result.

use std::sync::Arc;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// An access/refresh token pair.
///
/// Both halves always exist together; an anonymous session is represented
/// by the absence of a pair, never by a pair with an empty field.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(into = "RawPair")]
pub struct CredentialPair {
    access: Secret<String>,
    refresh: Secret<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }

    /// Bearer token attached to outbound calls.
    pub fn access(&self) -> &str {
        self.access.expose()
    }

    /// Token exchanged at the issuer for a new pair.
    pub fn refresh(&self) -> &str {
        self.refresh.expose()
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &self.access)
            .field("refresh", &self.refresh)
            .finish()
    }
}

/// Wire shape shared by the issuer responses and boundary messages.
#[derive(Serialize)]
struct RawPair {
    access: String,
    refresh: String,
}

impl From<CredentialPair> for RawPair {
    fn from(pair: CredentialPair) -> Self {
        Self {
            access: pair.access.expose().clone(),
            refresh: pair.refresh.expose().clone(),
        }
    }
}

/// Who caused a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Login, refresh, logout, or teardown inside the UI context
    Local,
    /// Pushed from the privileged host across the boundary channel
    Boundary,
}

/// Point-in-time view of the store, as published to subscribers.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pair: Option<CredentialPair>,
    pub origin: ChangeOrigin,
    /// Incremented on every mutation
    pub generation: u64,
}

/// Shared handle to the credential pair. Cloning is cheap and every clone
/// sees the same state.
#[derive(Clone)]
pub struct CredentialStore {
    state: Arc<watch::Sender<Snapshot>>,
}

impl CredentialStore {
    /// Create an anonymous (empty) store.
    pub fn new() -> Self {
        let (state, _) = watch::channel(Snapshot {
            pair: None,
            origin: ChangeOrigin::Local,
            generation: 0,
        });
        Self {
            state: Arc::new(state),
        }
    }

    /// Current pair, or `None` when anonymous.
    pub fn get(&self) -> Option<CredentialPair> {
        self.state.borrow().pair.clone()
    }

    /// Current pair together with its origin and generation.
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().pair.is_some()
    }

    /// Replace the whole pair (login, registration, refresh).
    pub fn set(&self, pair: CredentialPair) {
        self.publish(Some(pair), ChangeOrigin::Local);
        debug!("credentials set");
    }

    /// Drop the pair (logout, refresh failure, teardown).
    pub fn clear(&self) {
        self.publish(None, ChangeOrigin::Local);
        debug!("credentials cleared");
    }

    /// Receive a notification for every mutation.
    ///
    /// Intermediate snapshots may be coalesced when the receiver is slow;
    /// the latest value is never lost.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    /// Compare-and-set: replace (or clear) only if nothing else has mutated
    /// the store since `generation` was read. Returns whether it applied.
    pub fn replace_if(&self, generation: u64, pair: Option<CredentialPair>) -> bool {
        let applied = self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            state.pair = pair;
            state.origin = ChangeOrigin::Local;
            state.generation += 1;
            true
        });
        if !applied {
            debug!(generation, "stale credential update discarded");
        }
        applied
    }

    /// Apply a value pushed from the privileged host.
    ///
    /// Tagged `ChangeOrigin::Boundary` so the mirror does not echo it back.
    /// Replaying the value the store already holds is a no-op and returns
    /// `false`.
    pub fn apply_boundary(&self, pair: Option<CredentialPair>) -> bool {
        self.state.send_if_modified(|state| {
            if state.pair == pair {
                return false;
            }
            state.pair = pair;
            state.origin = ChangeOrigin::Boundary;
            state.generation += 1;
            true
        })
    }

    fn publish(&self, pair: Option<CredentialPair>, origin: ChangeOrigin) {
        self.state.send_modify(|state| {
            state.pair = pair;
            state.origin = origin;
            state.generation += 1;
        });
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
