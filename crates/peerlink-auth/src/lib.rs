//! Peerlink session library
//!
//! Keeps one credential pair per client session and makes every outbound
//! backend call authenticate with it. Components:
//!
//! - `CredentialStore`: single source of truth for the access/refresh pair
//! - `BoundaryMirror`: keeps a host-side replica in sync over a message channel
//! - `RefreshCoordinator`: single-flight token refresh shared by all callers
//! - `RequestGateway`: attaches the access token and retries once after a 401
//! - `Session`: login, registration, logout, and status on top of the above
//!
//! Credential flow:
//! 1. `Session::login()` obtains a pair and stores it
//! 2. The mirror forwards the pair to the host store
//! 3. A backend call returns 401; the gateway asks the coordinator to refresh
//! 4. The rotated pair replaces the old one atomically and the call is retried
//! 5. A rejected refresh clears the store and the caller sees `SessionExpired`

pub mod claims;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod issuer;
pub mod metrics;
pub mod mirror;
pub mod refresh;
pub mod session;

pub use constants::*;
pub use credentials::{ChangeOrigin, CredentialPair, CredentialStore, Snapshot};
pub use error::{Error, Result};
pub use gateway::{GatewayError, RequestGateway};
pub use issuer::{HttpIssuer, NewAccount, TokenIssuer};
pub use mirror::{
    BoundaryChannel, BoundaryEnd, BoundaryMessage, BoundaryMirror, MirrorHandle, boundary_link,
};
pub use refresh::RefreshCoordinator;
pub use session::{Session, SessionStatus};
