//! Host end of the boundary channel
//!
//! Applies UI messages to the `HostStore` and pushes host-originated
//! credential changes back to the UI. The UI store stays the owner; this side
//! only persists what it is told, plus rehydrates the UI once at startup.

use std::sync::Arc;

use peerlink_auth::{BoundaryMessage, CREDENTIALS_KEY, CredentialPair, claims};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::HostStore;

#[derive(Clone)]
pub struct HostBridge {
    store: Arc<HostStore>,
    to_ui: mpsc::UnboundedSender<BoundaryMessage>,
}

impl HostBridge {
    pub fn new(store: Arc<HostStore>, to_ui: mpsc::UnboundedSender<BoundaryMessage>) -> Self {
        Self { store, to_ui }
    }

    pub fn store(&self) -> &HostStore {
        &self.store
    }

    /// Apply one message from the UI. Replays are harmless.
    pub async fn handle(&self, message: &BoundaryMessage) -> Result<()> {
        match message {
            BoundaryMessage::Set { key, value } => {
                debug!(key, "host store set from UI");
                self.store.set(key, value.clone()).await
            }
            BoundaryMessage::Clear => {
                debug!("host store cleared from UI");
                self.store.clear().await
            }
        }
    }

    /// Push stored credentials to the UI so a restarted client resumes its
    /// session.
    ///
    /// A pair whose refresh token has already expired, or that cannot be
    /// parsed, is deleted instead. Returns whether a pair was pushed.
    pub async fn announce(&self) -> Result<bool> {
        let pair = match self.store.credentials().await {
            Ok(Some(pair)) => pair,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored credentials");
                self.store.remove(CREDENTIALS_KEY).await?;
                return Ok(false);
            }
        };

        if claims::is_expired(pair.refresh()) {
            info!("stored refresh token expired, discarding session");
            self.store.remove(CREDENTIALS_KEY).await?;
            return Ok(false);
        }

        self.push(Some(&pair))?;
        info!("stored session announced to UI");
        Ok(true)
    }

    /// Host-originated credential change: persist, then tell the UI.
    pub async fn update_credentials(&self, pair: Option<CredentialPair>) -> Result<()> {
        let message = encode(pair.as_ref())?;
        match &pair {
            Some(_) => self.handle(&message).await?,
            None => {
                self.store.remove(CREDENTIALS_KEY).await?;
            }
        }
        self.push(pair.as_ref())
    }

    /// Access token for privileged actions, if a session is stored.
    pub async fn access_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .credentials()
            .await?
            .map(|pair| pair.access().to_string()))
    }

    /// Apply UI messages until the UI end closes. Failures are logged and
    /// the loop keeps going.
    pub fn spawn(self, mut from_ui: mpsc::UnboundedReceiver<BoundaryMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = from_ui.recv().await {
                if let Err(e) = self.handle(&message).await {
                    warn!(error = %e, "failed to apply UI message to host store");
                }
            }
            debug!("UI end closed, host bridge stopping");
        })
    }

    fn push(&self, pair: Option<&CredentialPair>) -> Result<()> {
        self.to_ui
            .send(encode(pair)?)
            .map_err(|_| Error::Boundary("UI end closed".into()))
    }
}

fn encode(pair: Option<&CredentialPair>) -> Result<BoundaryMessage> {
    BoundaryMessage::for_credentials(pair).map_err(|e| Error::Boundary(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlink_auth::claims::unsigned_jwt;

    async fn bridge() -> (
        HostBridge,
        mpsc::UnboundedReceiver<BoundaryMessage>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::load(dir.path().join("host-store.json"))
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (HostBridge::new(Arc::new(store), tx), rx, dir)
    }

    fn set(pair: &CredentialPair) -> BoundaryMessage {
        BoundaryMessage::for_credentials(Some(pair)).unwrap()
    }

    #[tokio::test]
    async fn ui_messages_are_persisted() {
        let (bridge, _rx, _dir) = bridge().await;
        let pair = CredentialPair::new("A1", "R1");

        bridge.handle(&set(&pair)).await.unwrap();
        assert_eq!(bridge.store().credentials().await.unwrap(), Some(pair));
        assert_eq!(bridge.access_token().await.unwrap().as_deref(), Some("A1"));

        bridge.handle(&BoundaryMessage::Clear).await.unwrap();
        assert!(bridge.store().credentials().await.unwrap().is_none());
        assert!(bridge.access_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replayed_messages_leave_the_same_state() {
        let (bridge, _rx, _dir) = bridge().await;
        let message = set(&CredentialPair::new("A1", "R1"));

        bridge.handle(&message).await.unwrap();
        bridge.handle(&message).await.unwrap();

        assert_eq!(bridge.store().len().await, 1);
        assert_eq!(bridge.access_token().await.unwrap().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn announce_pushes_live_session() {
        let (bridge, mut rx, _dir) = bridge().await;
        let pair = CredentialPair::new("A1", unsigned_jwt(u64::MAX / 2));
        bridge.handle(&set(&pair)).await.unwrap();

        assert!(bridge.announce().await.unwrap());
        let pushed = rx.try_recv().unwrap();
        assert_eq!(pushed.credentials().unwrap(), Some(Some(pair)));
    }

    #[tokio::test]
    async fn announce_discards_expired_refresh_token() {
        let (bridge, mut rx, _dir) = bridge().await;
        bridge
            .handle(&set(&CredentialPair::new("A1", unsigned_jwt(1))))
            .await
            .unwrap();

        assert!(!bridge.announce().await.unwrap());
        assert!(rx.try_recv().is_err());
        assert!(bridge.store().get(CREDENTIALS_KEY).await.is_none());
    }

    #[tokio::test]
    async fn announce_discards_unreadable_credentials() {
        let (bridge, mut rx, _dir) = bridge().await;
        bridge
            .handle(&BoundaryMessage::Set {
                key: CREDENTIALS_KEY.into(),
                value: "garbage".into(),
            })
            .await
            .unwrap();

        assert!(!bridge.announce().await.unwrap());
        assert!(rx.try_recv().is_err());
        assert!(bridge.store().get(CREDENTIALS_KEY).await.is_none());
    }

    #[tokio::test]
    async fn update_credentials_persists_and_notifies() {
        let (bridge, mut rx, _dir) = bridge().await;
        bridge.store().set("theme", "dark".into()).await.unwrap();
        let pair = CredentialPair::new("A2", "R2");

        bridge.update_credentials(Some(pair.clone())).await.unwrap();
        assert_eq!(bridge.store().credentials().await.unwrap(), Some(pair.clone()));
        assert_eq!(
            rx.try_recv().unwrap().credentials().unwrap(),
            Some(Some(pair))
        );

        bridge.update_credentials(None).await.unwrap();
        assert!(bridge.store().credentials().await.unwrap().is_none());
        assert_eq!(bridge.store().get("theme").await.as_deref(), Some("dark"));
        assert_eq!(rx.try_recv().unwrap(), BoundaryMessage::Clear);
    }

    #[tokio::test]
    async fn spawned_bridge_applies_until_ui_closes() {
        let (bridge, _rx, _dir) = bridge().await;
        let store = bridge.store.clone();
        let (to_host, from_ui) = mpsc::unbounded_channel();
        let task = bridge.spawn(from_ui);

        to_host.send(set(&CredentialPair::new("A1", "R1"))).unwrap();
        drop(to_host);
        task.await.unwrap();

        assert_eq!(store.credentials().await.unwrap().unwrap().access(), "A1");
    }
}
