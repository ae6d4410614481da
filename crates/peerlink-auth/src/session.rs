//! Session facade: login, registration, logout, and status
//!
//! Wires one `CredentialStore` to the issuer, the refresh coordinator, and
//! the request gateway so that every component observes the same pair.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::claims;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::gateway::RequestGateway;
use crate::issuer::{HttpIssuer, NewAccount};
use crate::refresh::RefreshCoordinator;

/// Point-in-time view of the session, safe to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    /// `exp` claim of the access token, seconds since the epoch
    pub access_expires_at: Option<u64>,
    /// `exp` claim of the refresh token, seconds since the epoch
    pub refresh_expires_at: Option<u64>,
    pub refreshing: bool,
}

#[derive(Clone)]
pub struct Session {
    store: CredentialStore,
    issuer: Arc<HttpIssuer>,
    coordinator: RefreshCoordinator,
    gateway: RequestGateway,
}

impl Session {
    /// Session with an empty store.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self::with_store(CredentialStore::new(), client, base_url)
    }

    /// Session over an existing store (e.g. one fed by a boundary mirror).
    pub fn with_store(
        store: CredentialStore,
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        let issuer = Arc::new(HttpIssuer::new(client.clone(), base_url));
        let coordinator = RefreshCoordinator::new(store.clone(), issuer.clone());
        let gateway = RequestGateway::new(client, coordinator.clone());
        Self {
            store,
            issuer,
            coordinator,
            gateway,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn base_url(&self) -> &str {
        self.issuer.base_url()
    }

    /// Exchange username and password for a pair and store it.
    ///
    /// A failed login leaves the store untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let pair = self.issuer.obtain_pair(username, password).await?;
        self.store.set(pair);
        info!(username, "logged in");
        Ok(())
    }

    /// Create an account, then log in with it.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        self.issuer
            .register(&NewAccount {
                username,
                email,
                password,
            })
            .await?;
        self.login(username, password).await
    }

    /// Revoke the refresh token server-side (best effort) and clear the store.
    ///
    /// The store is cleared even when the backend call fails.
    pub async fn logout(&self) {
        if let Some(pair) = self.store.get() {
            if let Err(e) = self.issuer.logout(pair.refresh()).await {
                warn!(error = %e, "backend logout failed, clearing local session anyway");
            }
        }
        self.store.clear();
        info!("logged out");
    }

    pub fn status(&self) -> SessionStatus {
        let pair = self.store.get();
        SessionStatus {
            authenticated: pair.is_some(),
            access_expires_at: pair.as_ref().and_then(|p| claims::expires_at(p.access())),
            refresh_expires_at: pair.as_ref().and_then(|p| claims::expires_at(p.refresh())),
            refreshing: self.coordinator.is_refreshing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Json;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use crate::claims::unsigned_jwt;
    use crate::error::Error;

    struct Backend {
        logouts: AtomicUsize,
        access: String,
        refresh: String,
    }

    async fn start_backend(logout_status: StatusCode) -> (String, Arc<Backend>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let backend = Arc::new(Backend {
            logouts: AtomicUsize::new(0),
            access: unsigned_jwt(1_900_000_000),
            refresh: unsigned_jwt(1_900_086_400),
        });

        let app = axum::Router::new()
            .route(
                "/api/token/",
                post(
                    |State(b): State<Arc<Backend>>, Json(body): Json<Value>| async move {
                        if body["username"] == "carol" && body["password"] == "pw" {
                            (
                                StatusCode::OK,
                                Json(json!({"access": b.access, "refresh": b.refresh})),
                            )
                        } else {
                            (StatusCode::UNAUTHORIZED, Json(json!({"detail": "denied"})))
                        }
                    },
                ),
            )
            .route(
                "/api/users/",
                post(|Json(body): Json<Value>| async move {
                    if body["username"] == "carol" {
                        (StatusCode::CREATED, Json(json!({"id": 7})))
                    } else {
                        (StatusCode::BAD_REQUEST, Json(json!({"username": ["taken"]})))
                    }
                }),
            )
            .route(
                "/api/logout/",
                post(move |State(b): State<Arc<Backend>>| async move {
                    b.logouts.fetch_add(1, Ordering::SeqCst);
                    logout_status
                }),
            )
            .with_state(backend.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api"), backend)
    }

    #[tokio::test]
    async fn login_populates_store_and_status() {
        let (base_url, backend) = start_backend(StatusCode::RESET_CONTENT).await;
        let session = Session::new(reqwest::Client::new(), base_url);
        assert!(!session.status().authenticated);

        session.login("carol", "pw").await.unwrap();

        let pair = session.store().get().unwrap();
        assert_eq!(pair.access(), backend.access);
        let status = session.status();
        assert!(status.authenticated);
        assert_eq!(status.access_expires_at, Some(1_900_000_000));
        assert_eq!(status.refresh_expires_at, Some(1_900_086_400));
        assert!(!status.refreshing);
    }

    #[tokio::test]
    async fn failed_login_leaves_existing_session() {
        let (base_url, _) = start_backend(StatusCode::RESET_CONTENT).await;
        let session = Session::new(reqwest::Client::new(), base_url);
        session
            .store()
            .set(crate::credentials::CredentialPair::new("A0", "R0"));

        let result = session.login("carol", "wrong").await;
        assert!(matches!(result, Err(Error::Rejected { status: 401, .. })));
        assert_eq!(session.store().get().unwrap().access(), "A0");
    }

    #[tokio::test]
    async fn register_logs_in() {
        let (base_url, _) = start_backend(StatusCode::RESET_CONTENT).await;
        let session = Session::new(reqwest::Client::new(), base_url);

        session.register("carol", "carol@example.com", "pw").await.unwrap();
        assert!(session.store().is_authenticated());

        let taken = session.register("dave", "dave@example.com", "pw").await;
        assert!(matches!(taken, Err(Error::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let (base_url, backend) = start_backend(StatusCode::INTERNAL_SERVER_ERROR).await;
        let session = Session::new(reqwest::Client::new(), base_url);
        session.login("carol", "pw").await.unwrap();

        session.logout().await;

        assert!(!session.store().is_authenticated());
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn logout_without_session_skips_backend() {
        let (base_url, backend) = start_backend(StatusCode::RESET_CONTENT).await;
        let session = Session::new(reqwest::Client::new(), base_url);

        session.logout().await;

        assert!(!session.store().is_authenticated());
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 0);
    }
}
