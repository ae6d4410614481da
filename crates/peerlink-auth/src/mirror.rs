//! Boundary mirror between the UI credential store and the privileged host
//!
//! The UI-side `CredentialStore` is the owner; the host store is a
//! best-effort replica used for persistence across restarts and for
//! privileged network actions. Messages cross an asynchronous FIFO channel:
//!
//! - outbound: every `Local` store change becomes `set credentials <json>` or
//!   `clear`; delivery is fire-and-forget
//! - inbound: host pushes (e.g. credentials loaded from disk at startup) are
//!   applied with `CredentialStore::apply_boundary`, which is tagged so the
//!   outbound side does not echo them back
//!
//! The pair always travels as one value so the replica never holds half of
//! it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::CREDENTIALS_KEY;
use crate::credentials::{ChangeOrigin, CredentialPair, CredentialStore, Snapshot};
use crate::error::{Error, Result};
use crate::metrics::record_boundary;

/// A message crossing the process boundary, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BoundaryMessage {
    Set { key: String, value: String },
    Clear,
}

impl BoundaryMessage {
    /// Encode a store value: a pair becomes `set credentials`, no pair
    /// becomes `clear`.
    pub fn for_credentials(pair: Option<&CredentialPair>) -> Result<Self> {
        match pair {
            Some(pair) => Ok(BoundaryMessage::Set {
                key: CREDENTIALS_KEY.to_string(),
                value: serde_json::to_string(pair)
                    .map_err(|e| Error::Encoding(format!("encoding credentials: {e}")))?,
            }),
            None => Ok(BoundaryMessage::Clear),
        }
    }

    /// Decode the credential value this message carries.
    ///
    /// `Ok(None)` for messages about other keys; `Ok(Some(None))` for
    /// `clear`.
    pub fn credentials(&self) -> Result<Option<Option<CredentialPair>>> {
        match self {
            BoundaryMessage::Set { key, value } if key == CREDENTIALS_KEY => {
                let pair = serde_json::from_str(value)
                    .map_err(|e| Error::Encoding(format!("decoding credentials: {e}")))?;
                Ok(Some(Some(pair)))
            }
            BoundaryMessage::Set { .. } => Ok(None),
            BoundaryMessage::Clear => Ok(Some(None)),
        }
    }
}

/// Sending half of the boundary channel.
///
/// `send` is called while the mirror holds its publish lock, so messages
/// enter the channel in store generation order. Implementations should
/// return promptly; a slow send delays every other publisher.
pub trait BoundaryChannel: Send + Sync {
    fn send(&self, message: BoundaryMessage) -> Result<()>;
}

impl BoundaryChannel for mpsc::UnboundedSender<BoundaryMessage> {
    fn send(&self, message: BoundaryMessage) -> Result<()> {
        mpsc::UnboundedSender::send(self, message)
            .map_err(|_| Error::Boundary("boundary channel closed".into()))
    }
}

/// One side of an in-process boundary link.
pub struct BoundaryEnd {
    pub outbound: mpsc::UnboundedSender<BoundaryMessage>,
    pub inbound: mpsc::UnboundedReceiver<BoundaryMessage>,
}

/// Create a connected pair of ends: `(ui, host)`.
pub fn boundary_link() -> (BoundaryEnd, BoundaryEnd) {
    let (to_host, from_ui) = mpsc::unbounded_channel();
    let (to_ui, from_host) = mpsc::unbounded_channel();
    (
        BoundaryEnd {
            outbound: to_host,
            inbound: from_host,
        },
        BoundaryEnd {
            outbound: to_ui,
            inbound: from_ui,
        },
    )
}

/// Keeps the host replica in step with the UI credential store.
#[derive(Clone)]
pub struct BoundaryMirror {
    store: CredentialStore,
    channel: Arc<dyn BoundaryChannel>,
    /// Generation of the last snapshot pushed outbound. Held for the whole
    /// read-compare-send so a stale generation can never be sent last.
    published: Arc<Mutex<u64>>,
}

impl BoundaryMirror {
    pub fn new(store: CredentialStore, channel: Arc<dyn BoundaryChannel>) -> Self {
        let published = Arc::new(Mutex::new(store.snapshot().generation));
        Self {
            store,
            channel,
            published,
        }
    }

    /// Rebuild the replica from the owner's current value, even if it was
    /// already pushed.
    pub fn resync(&self) {
        let mut published = self.lock_published();
        let snapshot = self.store.snapshot();
        self.send(&snapshot);
        *published = (*published).max(snapshot.generation);
    }

    /// Push the current value if it is a local change newer than anything
    /// already sent. Values pushed in by the host are never echoed back.
    pub fn flush(&self) {
        let mut published = self.lock_published();
        let snapshot = self.store.snapshot();
        if snapshot.generation <= *published {
            return;
        }
        if snapshot.origin == ChangeOrigin::Local {
            self.send(&snapshot);
        }
        *published = snapshot.generation;
    }

    fn lock_published(&self) -> MutexGuard<'_, u64> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Failures are logged and dropped; the store is never affected.
    fn send(&self, snapshot: &Snapshot) {
        let sent = BoundaryMessage::for_credentials(snapshot.pair.as_ref())
            .and_then(|message| self.channel.send(message));
        match sent {
            Ok(()) => {
                debug!(
                    generation = snapshot.generation,
                    authenticated = snapshot.pair.is_some(),
                    "credentials mirrored to host"
                );
                record_boundary("outbound", "sent");
            }
            Err(e) => {
                warn!(error = %e, "failed to mirror credentials to host, continuing");
                record_boundary("outbound", "dropped");
            }
        }
    }

    /// Apply a message pushed by the host. Returns whether the store
    /// changed; replays of the current value return `false`.
    pub fn apply_inbound(&self, message: &BoundaryMessage) -> bool {
        match message.credentials() {
            Ok(Some(pair)) => {
                let authenticated = pair.is_some();
                let changed = self.store.apply_boundary(pair);
                if changed {
                    info!(authenticated, "credentials updated from host");
                    record_boundary("inbound", "applied");
                } else {
                    debug!("host push matches current credentials");
                    record_boundary("inbound", "ignored");
                }
                changed
            }
            Ok(None) => {
                debug!(?message, "ignoring host message for unrelated key");
                record_boundary("inbound", "ignored");
                false
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed host message");
                record_boundary("inbound", "dropped");
                false
            }
        }
    }

    /// Spawn the outbound watcher and the inbound applier.
    ///
    /// The current store value is not pushed at start; call `resync` for
    /// that.
    pub fn spawn(self, mut inbound: mpsc::UnboundedReceiver<BoundaryMessage>) -> MirrorHandle {
        let mut changes = self.store.subscribe();

        let outbound_mirror = self.clone();
        let outbound = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                drop(changes.borrow_and_update());
                outbound_mirror.flush();
            }
            debug!("credential store dropped, outbound mirror stopping");
        });

        let inbound_mirror = self.clone();
        let inbound = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                inbound_mirror.apply_inbound(&message);
            }
            debug!("host end closed, inbound mirror stopping");
        });

        MirrorHandle {
            mirror: self,
            outbound,
            inbound,
        }
    }
}

/// Running mirror tasks.
pub struct MirrorHandle {
    mirror: BoundaryMirror,
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl MirrorHandle {
    pub fn mirror(&self) -> &BoundaryMirror {
        &self.mirror
    }

    /// Push any pending local change, then stop both tasks.
    pub async fn close(self) {
        self.mirror.flush();
        self.outbound.abort();
        self.inbound.abort();
        let _ = self.outbound.await;
        let _ = self.inbound.await;
    }
}
