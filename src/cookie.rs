//! Session cookie minting and verification.
//!
//! A session id is an opaque random token; the cookie also carries an
//! HMAC-SHA256 signature over `<session-id>:<route-id>` so a socket upgrade
//! can reject a cookie minted for a different route, or tampered with,
//! before ever subscribing it to a channel.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Mints a fresh random session id (16 bytes, base64url-encoded).
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Signs `session_id` for `route_id`, producing the full cookie value:
/// `<session_id>.<signature>`.
pub fn sign(session_id: &str, route_id: &str, key: &[u8]) -> String {
    let signature = compute_signature(session_id, route_id, key);
    format!("{session_id}.{signature}")
}

/// Verifies a cookie value produced by `sign` and returns the session id on
/// success. Rejects malformed values, signatures computed for a different
/// `route_id`, and any tampering.
pub fn verify(cookie_value: &str, route_id: &str, key: &[u8]) -> Option<String> {
    let (session_id, signature) = cookie_value.rsplit_once('.')?;
    let expected = compute_signature(session_id, route_id, key);
    if constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
        Some(session_id.to_owned())
    } else {
        None
    }
}

/// Compares two byte strings without short-circuiting on the first
/// mismatch, so the time this takes doesn't leak how many leading bytes of
/// a forged signature happened to be correct.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn compute_signature(session_id: &str, route_id: &str, key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(session_id.as_bytes());
    mac.update(b":");
    mac.update(route_id.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let id = new_session_id();
        let cookie = sign(&id, "todos", b"secret");
        assert_eq!(verify(&cookie, "todos", b"secret"), Some(id));
    }

    #[test]
    fn verify_rejects_a_cookie_signed_for_a_different_route() {
        let id = new_session_id();
        let cookie = sign(&id, "todos", b"secret");
        assert_eq!(verify(&cookie, "other-route", b"secret"), None);
    }

    #[test]
    fn verify_rejects_a_tampered_session_id() {
        let id = new_session_id();
        let cookie = sign(&id, "todos", b"secret");
        let (_, signature) = cookie.rsplit_once('.').unwrap();
        let tampered = format!("not-the-real-id.{signature}");
        assert_eq!(verify(&tampered, "todos", b"secret"), None);
    }

    #[test]
    fn verify_rejects_malformed_values() {
        assert_eq!(verify("no-dot-here", "todos", b"secret"), None);
    }

    #[test]
    fn verify_rejects_a_case_permuted_signature() {
        let id = new_session_id();
        let cookie = sign(&id, "todos", b"secret");
        let (session_id, signature) = cookie.rsplit_once('.').unwrap();
        let permuted = format!("{session_id}.{}", signature.to_ascii_uppercase());
        assert_eq!(verify(&permuted, "todos", b"secret"), None);
    }

    #[test]
    fn new_session_ids_are_not_repeated() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }
}
