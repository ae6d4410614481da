//! Authenticated request gateway
//!
//! Every outbound backend call goes through `RequestGateway::execute`, which
//! attaches the current access token and recovers from a single
//! authorization failure:
//!
//! ```text
//! Sent ─┬─> Success / other status / transport error   (returned as-is)
//!       └─> 401 ──> refresh ─┬─> retried once ──> final (whatever the status)
//!                            └─> refresh failed ──> SessionExpired
//! ```
//!
//! Retry policy for non-authorization failures is the caller's business.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response, StatusCode};
use tracing::{Instrument, debug, debug_span, info, warn};
use uuid::Uuid;

use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::Error;
use crate::metrics::record_retry;
use crate::refresh::RefreshCoordinator;

/// Errors surfaced by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Authorization could not be recovered (always `Error::SessionExpired`)
    /// or the stored token could not be encoded as a header.
    #[error(transparent)]
    Session(#[from] Error),

    /// Network-level failure, passed through untouched.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    /// Whether the UI must route the user back to the login view.
    pub fn requires_login(&self) -> bool {
        match self {
            GatewayError::Session(e) => e.requires_login(),
            GatewayError::Transport(_) => false,
        }
    }
}

/// Wraps outbound calls with bearer authentication and one-shot refresh.
#[derive(Clone)]
pub struct RequestGateway {
    client: reqwest::Client,
    coordinator: RefreshCoordinator,
}

impl RequestGateway {
    pub fn new(client: reqwest::Client, coordinator: RefreshCoordinator) -> Self {
        Self {
            client,
            coordinator,
        }
    }

    /// Client for building requests (shares the connection pool).
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn store(&self) -> &CredentialStore {
        self.coordinator.store()
    }

    /// Build and execute a request.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, GatewayError> {
        self.execute(request.build()?).await
    }

    /// Execute a request with the current access token attached.
    ///
    /// Any `Authorization` header already on the request is replaced (or
    /// removed when anonymous). Requests with streaming bodies cannot be
    /// replayed; their 401 is returned unchanged.
    pub async fn execute(&self, request: Request) -> Result<Response, GatewayError> {
        let span = debug_span!(
            "gateway_call",
            call_id = %Uuid::new_v4(),
            method = %request.method(),
            path = request.url().path(),
        );
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: Request) -> Result<Response, GatewayError> {
        let replay = request.try_clone();
        let used = self.coordinator.store().get();

        let response = self.dispatch(request, used.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            warn!("unauthorized request has a non-replayable body, not retrying");
            record_retry("not_replayable");
            return Ok(response);
        };

        debug!(authenticated = used.is_some(), "call unauthorized, refreshing");
        let pair = match self
            .coordinator
            .refresh_stale(used.as_ref().map(CredentialPair::access))
            .await
        {
            Ok(pair) => pair,
            Err(cause) => {
                info!(error = %cause, "session expired");
                record_retry("session_expired");
                return Err(Error::SessionExpired {
                    status: response.status().as_u16(),
                    cause: Box::new(cause),
                }
                .into());
            }
        };

        record_retry("retried");
        let retried = self.dispatch(replay, Some(&pair)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("call unauthorized after refresh, giving up");
        }
        Ok(retried)
    }

    async fn dispatch(
        &self,
        mut request: Request,
        pair: Option<&CredentialPair>,
    ) -> Result<Response, GatewayError> {
        match pair {
            Some(pair) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", pair.access()))
                    .map_err(|e| {
                        Error::Encoding(format!("access token is not a valid header value: {e}"))
                    })?;
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            None => {
                request.headers_mut().remove(AUTHORIZATION);
            }
        }
        Ok(self.client.execute(request).await?)
    }
}
