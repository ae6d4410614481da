//! Peerlink backend endpoint paths and boundary keys
//!
//! Paths are relative to the configured API base URL
//! (e.g. `http://localhost:8000/api`). The trailing slashes are part of the
//! backend's routing and must be preserved.

/// Login exchange: username/password for an access/refresh pair
pub const TOKEN_PATH: &str = "/token/";

/// Refresh exchange: refresh token for a rotated access/refresh pair
pub const REFRESH_PATH: &str = "/token/refresh/";

/// Account registration
pub const USERS_PATH: &str = "/users/";

/// Server-side logout (refresh token blacklisting)
pub const LOGOUT_PATH: &str = "/logout/";

/// Key under which the credential pair travels across the boundary channel
/// and is persisted in the host store.
pub const CREDENTIALS_KEY: &str = "credentials";

/// Default API base URL for a local backend
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Join a base URL and an endpoint path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
