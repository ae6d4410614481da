//! Unverified JWT claim inspection
//!
//! The backend issues JWTs for both tokens. The client never verifies
//! signatures (it can't, the key is server-side); it only peeks at `exp` to
//! avoid rehydrating a session whose refresh token has already lapsed and to
//! report expiry in `Session::status`.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: u64,
}

/// Expiration of a JWT as unix seconds, or `None` if the token is not a
/// JWT or carries no numeric `exp` claim.
pub fn expires_at(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice::<ExpiryClaim>(&bytes)
        .ok()
        .map(|claim| claim.exp)
}

/// Whether the token is known to be expired at `now` (unix seconds).
///
/// Opaque tokens without a readable `exp` are treated as not expired; the
/// issuer has the final word.
pub fn is_expired_at(token: &str, now: u64) -> bool {
    expires_at(token).is_some_and(|exp| exp <= now)
}

/// `is_expired_at` against the system clock.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, now_secs())
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build an unsigned JWT carrying `exp`. Test helper shared across crates.
#[doc(hidden)]
pub fn unsigned_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"token_type":"access","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}
