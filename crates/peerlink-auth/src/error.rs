//! Error types for session operations
//!
//! Payloads are strings so that a single refresh outcome can be cloned and
//! handed to every caller queued behind the same refresh cycle.

/// Errors from session, refresh, and boundary operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("issuer rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid issuer response: {0}")]
    InvalidResponse(String),

    #[error("no session: login required")]
    NoSession,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("session expired after HTTP {status}: {cause}")]
    SessionExpired {
        status: u16,
        #[source]
        cause: Box<Error>,
    },

    #[error("boundary channel error: {0}")]
    Boundary(String),

    #[error("boundary message encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// Whether the UI must route the user back to the login view.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Error::NoSession | Error::RefreshFailed(_) | Error::SessionExpired { .. }
        )
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
