//! Privileged host side of the Peerlink session
//!
//! Owns the on-disk replica of the session credentials and the host end of
//! the boundary channel. Nothing here decides when tokens change; it
//! persists what the UI sends and hands stored credentials back at startup.

pub mod bridge;
pub mod error;
pub mod store;

pub use bridge::HostBridge;
pub use error::{Error, Result};
pub use store::HostStore;
