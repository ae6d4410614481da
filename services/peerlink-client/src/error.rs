//! Client-specific error types

use thiserror::Error;

/// Errors raised before any session work starts.
///
/// Session and API failures keep their own types (`peerlink_auth::Error`,
/// `peerlink_api::ApiError`) so `requires_login` can be checked on them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("usage: {0}")]
    Usage(String),

    #[error("no password configured; set PEERLINK_PASSWORD or auth.password_file")]
    MissingPassword,
}
