//! Shared fixtures for integration tests: an RSA keypair, token signing,
//! and rotation-event payload construction.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use token_rotor::{KeyDirectory, KeyRecord};

pub const RSA_PRIVATE_PEM: &str = include_str!("../fixtures/rsa_private.pem");
pub const RSA_PUBLIC_PEM: &str = include_str!("../fixtures/rsa_public.pem");

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("fixture timestamp")
}

/// A key record carrying the fixture public key.
pub fn key_record(key_id: &str, generation: &str, expiration: &str) -> KeyRecord {
    KeyRecord {
        key_id: key_id.to_string(),
        public_key: RSA_PUBLIC_PEM.to_string(),
        generation_date: ts(generation),
        expiration_date: ts(expiration),
    }
}

/// One rotation-event wire payload carrying the fixture public key.
pub fn rotation_payload(key_id: &str, generation: &str, expiration: &str) -> Bytes {
    serde_json::json!({
        "key_id": key_id,
        "public_key": RSA_PUBLIC_PEM,
        "generation_date": generation,
        "expiration_date": expiration,
    })
    .to_string()
    .into()
}

/// Sign `claims` with the fixture private key under the given `kid`.
pub fn sign_token(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).expect("fixture private key");
    encode(&header, claims, &key).expect("token signs")
}

/// Poll until the directory holds `expected` records, or fail after 5s.
pub async fn wait_for_keys(directory: &Arc<KeyDirectory>, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while directory.len() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "directory never reached {expected} keys (has {})",
            directory.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
