//! HMAC-signed authentication tokens with sliding expiry.
//!
//! A token is the hex encoding of a length-prefixed binary timestamp
//! followed by an HMAC-SHA256 of that timestamp, keyed by the stored
//! password hash. The token carries its own issue time, so verification
//! needs no server-side session state: recompute the MAC, check the age,
//! and re-issue when the token enters the refresh window.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::routes::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the token.
pub const COOKIE_NAME: &str = "auth";

/// Age past which a token is re-issued on the next request.
const REFRESH_SECS: i64 = 24 * 60 * 60;
/// Age past which a token is rejected.
const EXPIRE_SECS: i64 = 7 * 24 * 60 * 60;

/// Authentication material derived from the configured password.
#[derive(Debug, Clone, Default)]
pub struct AuthKeys {
    /// SHA-256 of salt ++ password; doubles as the token signing key.
    hash: [u8; 32],
    salt: [u8; 32],
    enabled: bool,
}

impl AuthKeys {
    pub fn new(hash: [u8; 32], salt: [u8; 32]) -> Self {
        Self {
            hash,
            salt,
            enabled: true,
        }
    }

    /// Keys that authenticate every request (no password configured).
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `body` is the configured password.
    pub fn check_password(&self, body: &[u8]) -> bool {
        if !self.enabled {
            return false;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        hasher.update(body);
        hasher.finalize().as_slice() == self.hash
    }

    /// Sign `issued` into a token string.
    pub fn format_token(&self, issued: DateTime<Utc>) -> String {
        let ts = encode_time(issued);
        let mut mac =
            HmacSha256::new_from_slice(&self.hash).expect("HMAC accepts any key length");
        mac.update(&ts);
        let tag = mac.finalize().into_bytes();
        format!("{:02x}{}{}", ts.len(), hex_encode(&ts), hex_encode(&tag))
    }

    /// Validate a token and recover its issue time. Returns `None` for
    /// malformed, forged, or tampered tokens.
    pub fn parse_token(&self, token: &str) -> Option<DateTime<Utc>> {
        let bytes = hex_decode(token)?;
        let (&len, rest) = bytes.split_first()?;
        let len = len as usize;
        if len > rest.len() {
            return None;
        }
        let (ts, tag) = rest.split_at(len);
        let mut mac =
            HmacSha256::new_from_slice(&self.hash).expect("HMAC accepts any key length");
        mac.update(ts);
        mac.verify_slice(tag).ok()?;
        decode_time(ts)
    }
}

/// 12-byte big-endian binary timestamp: i64 seconds, u32 nanoseconds.
fn encode_time(t: DateTime<Utc>) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&t.timestamp().to_be_bytes());
    out.extend_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
    out
}

fn decode_time(bytes: &[u8]) -> Option<DateTime<Utc>> {
    if bytes.len() != 12 {
        return None;
    }
    let secs = i64::from_be_bytes(bytes[..8].try_into().ok()?);
    let nanos = u32::from_be_bytes(bytes[8..].try_into().ok()?);
    DateTime::from_timestamp(secs, nanos)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap());
        out.push(char::from_digit((b & 0x0f) as u32, 16).unwrap());
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    Some(out)
}

/// `Set-Cookie` value installing `token`.
pub(crate) fn cookie_header(token: &str) -> String {
    format!("{COOKIE_NAME}={token}; Path=/; Max-Age={EXPIRE_SECS}; HttpOnly")
}

/// Extract a cookie value from request headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Middleware guarding everything except the login endpoint.
///
/// Tokens older than the refresh period are re-issued on the way out;
/// tokens older than the expiry period (and missing or forged ones) are
/// rejected outright.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.enabled() {
        return next.run(request).await;
    }

    let issued = cookie_value(request.headers(), COOKIE_NAME)
        .and_then(|token| state.auth.parse_token(&token));
    let Some(issued) = issued else {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };
    let age = (Utc::now() - issued).num_seconds();
    if age > EXPIRE_SECS {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let refresh = age > REFRESH_SECS;
    let mut response = next.run(request).await;
    if refresh {
        let token = state.auth.format_token(Utc::now());
        if let Ok(value) = HeaderValue::from_str(&cookie_header(&token)) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn keys() -> AuthKeys {
        AuthKeys::new([7u8; 32], [3u8; 32])
    }

    #[test]
    fn token_round_trips() {
        let keys = keys();
        let issued = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 45).unwrap();
        let token = keys.format_token(issued);
        assert_eq!(keys.parse_token(&token), Some(issued));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let keys = keys();
        let token = keys.format_token(Utc::now());

        let mut tampered = token.clone();
        let flipped = if tampered.ends_with('0') { '1' } else { '0' };
        tampered.pop();
        tampered.push(flipped);
        assert_eq!(keys.parse_token(&tampered), None);
    }

    #[test]
    fn foreign_keys_are_rejected() {
        let token = keys().format_token(Utc::now());
        let other = AuthKeys::new([8u8; 32], [3u8; 32]);
        assert_eq!(other.parse_token(&token), None);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let keys = keys();
        assert_eq!(keys.parse_token(""), None);
        assert_eq!(keys.parse_token("zz"), None);
        assert_eq!(keys.parse_token("00"), None);
        assert_eq!(keys.parse_token("ff00"), None);
    }

    #[test]
    fn password_check() {
        let salt = [3u8; 32];
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(b"hunter2!");
        let hash: [u8; 32] = hasher.finalize().into();

        let keys = AuthKeys::new(hash, salt);
        assert!(keys.check_password(b"hunter2!"));
        assert!(!keys.check_password(b"wrong"));
        assert!(!AuthKeys::disabled().check_password(b"hunter2!"));
    }

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; auth=deadbeef; other=1"),
        );
        assert_eq!(cookie_value(&headers, "auth").as_deref(), Some("deadbeef"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
