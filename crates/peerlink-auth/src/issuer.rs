//! Token issuer: login, refresh, registration, and logout exchanges
//!
//! All exchanges are JSON POSTs against the Peerlink backend. Only the
//! refresh exchange sits behind the `TokenIssuer` trait, since it is the one
//! the refresh coordinator depends on; login, registration, and logout are
//! plain methods on `HttpIssuer` used by `Session`.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::debug;

use crate::constants::{LOGOUT_PATH, REFRESH_PATH, TOKEN_PATH, USERS_PATH, endpoint};
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Maximum response body length carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Exchanges a refresh token for a new credential pair.
///
/// Uses `Pin<Box<dyn Future>>` so the coordinator can hold an
/// `Arc<dyn TokenIssuer>`.
pub trait TokenIssuer: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialPair>> + Send + 'a>>;
}

/// Registration request body
#[derive(Debug, Serialize)]
pub struct NewAccount<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LogoutBody<'a> {
    refresh_token: &'a str,
}

/// reqwest-backed issuer for the Peerlink backend.
///
/// Clone is cheap; `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct HttpIssuer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIssuer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /token/refresh/`. Only HTTP 200 with both tokens counts as
    /// success.
    pub async fn refresh_pair(&self, refresh_token: &str) -> Result<CredentialPair> {
        let response = self
            .client
            .post(endpoint(&self.base_url, REFRESH_PATH))
            .json(&RefreshBody {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;
        read_pair(response, "refresh").await
    }

    /// `POST /token/` with username and password.
    pub async fn obtain_pair(&self, username: &str, password: &str) -> Result<CredentialPair> {
        let response = self
            .client
            .post(endpoint(&self.base_url, TOKEN_PATH))
            .json(&LoginBody { username, password })
            .send()
            .await
            .map_err(|e| Error::Http(format!("login request failed: {e}")))?;
        read_pair(response, "login").await
    }

    /// `POST /users/`. The backend returns the created user, not tokens.
    pub async fn register(&self, account: &NewAccount<'_>) -> Result<()> {
        let response = self
            .client
            .post(endpoint(&self.base_url, USERS_PATH))
            .json(account)
            .send()
            .await
            .map_err(|e| Error::Http(format!("registration request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(rejected(response).await);
        }
        debug!(username = account.username, "account registered");
        Ok(())
    }

    /// `POST /logout/`, asking the backend to blacklist the refresh token.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let response = self
            .client
            .post(endpoint(&self.base_url, LOGOUT_PATH))
            .json(&LogoutBody { refresh_token })
            .send()
            .await
            .map_err(|e| Error::Http(format!("logout request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }
}

impl TokenIssuer for HttpIssuer {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialPair>> + Send + 'a>> {
        Box::pin(self.refresh_pair(refresh_token))
    }
}

async fn read_pair(response: reqwest::Response, exchange: &str) -> Result<CredentialPair> {
    if response.status() != reqwest::StatusCode::OK {
        return Err(rejected(response).await);
    }
    response
        .json::<CredentialPair>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid {exchange} response: {e}")))
}

async fn rejected(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    Error::Rejected {
        status,
        body: truncate_body(&body),
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut cut = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
}
