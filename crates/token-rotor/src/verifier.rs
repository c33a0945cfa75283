//! Request-path token verification against the key directory.
//!
//! [`TokenVerifier`] consumes an untrusted compact serialized token, resolves
//! the signing key named by its header, and checks the signature and
//! time-bounded claims at a caller-supplied instant. It only ever reads the
//! directory; verification is a synchronous, in-memory operation so requests
//! verify in parallel without serializing on each other.
//!
//! # Security
//!
//! - Tokens are size-checked before any parsing (DoS prevention)
//! - Only RS256 signatures are accepted; the header `alg` cannot downgrade it
//! - Failures are distinct variants - unknown key, expired key, and bad
//!   signature carry different operational meaning and are never coalesced

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::directory::{KeyDirectory, LookupError};

/// Maximum accepted token size in bytes (8 KiB).
///
/// Typical tokens are a few hundred bytes; anything larger is rejected
/// before base64 decoding or signature work happens.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// The decoded claim mapping of a successfully verified token.
pub type ClaimSet = serde_json::Map<String, Value>;

/// Why a token failed verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Not a well-formed three-segment signed token, or the header segment
    /// does not decode.
    #[error("token is not a well-formed signed token")]
    MalformedToken,

    /// The token header carries no usable `kid` field.
    #[error("token header carries no key id")]
    MissingKeyId,

    /// No signing key is known for the token's key id.
    #[error("no signing key with the requested id")]
    UnknownKey,

    /// The signing key exists but is outside its validity window.
    #[error("signing key is outside its validity window")]
    KeyExpired,

    /// The signature does not verify against the resolved public key.
    #[error("token signature does not match the signing key")]
    InvalidSignature,

    /// A time-bounded claim (`exp`/`nbf`) is violated at the verification
    /// instant. Distinct from key expiry.
    #[error("token time-bounded claims are outside the allowed window")]
    ClaimsExpired,
}

impl From<LookupError> for VerifyError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownKey => Self::UnknownKey,
            LookupError::KeyExpired => Self::KeyExpired,
        }
    }
}

/// Verifies tokens against the shared key directory.
#[derive(Clone)]
pub struct TokenVerifier {
    directory: Arc<KeyDirectory>,
    check_time_claims: bool,
}

impl TokenVerifier {
    /// Create a verifier reading from `directory`, with time-bounded claim
    /// checks enabled.
    #[must_use]
    pub fn new(directory: Arc<KeyDirectory>) -> Self {
        Self {
            directory,
            check_time_claims: true,
        }
    }

    /// Enable or disable `exp`/`nbf` claim validation.
    #[must_use]
    pub fn with_time_claim_checks(mut self, enabled: bool) -> Self {
        self.check_time_claims = enabled;
        self
    }

    /// Verify `token` at the instant `now` and return its claim mapping.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::MalformedToken`] - not a three-segment token, or the
    ///   header/payload does not decode
    /// - [`VerifyError::MissingKeyId`] - header carries no non-empty `kid`
    /// - [`VerifyError::UnknownKey`] / [`VerifyError::KeyExpired`] -
    ///   propagated unchanged from the directory lookup at `now`
    /// - [`VerifyError::InvalidSignature`] - signature check failed
    /// - [`VerifyError::ClaimsExpired`] - `exp` passed or `nbf` not yet
    ///   reached at `now` (only when time claim checks are enabled)
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ClaimSet, VerifyError> {
        let kid = extract_kid(token)?;
        let record = self.directory.lookup(&kid, now)?;

        let decoding_key = DecodingKey::from_rsa_pem(record.public_key.as_bytes()).map_err(|e| {
            debug!(
                target: "token_rotor.verifier",
                kid = %kid,
                error = %e,
                "stored public key material did not parse"
            );
            VerifyError::InvalidSignature
        })?;

        // Signature-only validation: time-bounded claims are checked below
        // against the caller-supplied instant, not the wall clock.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data =
            decode::<ClaimSet>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => VerifyError::MalformedToken,
                _ => {
                    debug!(
                        target: "token_rotor.verifier",
                        kid = %kid,
                        error = %e,
                        "token signature verification failed"
                    );
                    VerifyError::InvalidSignature
                }
            })?;

        if self.check_time_claims {
            validate_time_claims(&data.claims, now)?;
        }

        Ok(data.claims)
    }
}

/// Extract the `kid` from a token header without verifying the signature.
///
/// The returned id is untrusted and only suitable for looking up a key in
/// the directory; the token must still be verified against that key.
///
/// # Errors
///
/// - [`VerifyError::MalformedToken`] - oversized token, wrong segment count,
///   bad base64, or a header that is not a JSON object
/// - [`VerifyError::MissingKeyId`] - `kid` absent, empty, or not a string
pub fn extract_kid(token: &str) -> Result<String, VerifyError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        debug!(
            target: "token_rotor.verifier",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "token rejected: size exceeds maximum allowed"
        );
        return Err(VerifyError::MalformedToken);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(VerifyError::MalformedToken);
    }

    let header_part = parts.first().ok_or(VerifyError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        debug!(target: "token_rotor.verifier", error = %e, "token header is not valid base64url");
        VerifyError::MalformedToken
    })?;

    let header: Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        debug!(target: "token_rotor.verifier", error = %e, "token header is not valid JSON");
        VerifyError::MalformedToken
    })?;

    header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(VerifyError::MissingKeyId)
}

/// Check `exp`/`nbf` claims against the verification instant.
///
/// Absent claims pass; the rotation stream governs key lifetime, tokens opt
/// into their own bounds by carrying the claims.
fn validate_time_claims(claims: &ClaimSet, now: DateTime<Utc>) -> Result<(), VerifyError> {
    let now_secs = now.timestamp();

    if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
        if now_secs >= exp {
            debug!(
                target: "token_rotor.verifier",
                exp = exp,
                now = now_secs,
                "token expired"
            );
            return Err(VerifyError::ClaimsExpired);
        }
    }

    if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
        if now_secs < nbf {
            debug!(
                target: "token_rotor.verifier",
                nbf = nbf,
                now = now_secs,
                "token not yet valid"
            );
            return Err(VerifyError::ClaimsExpired);
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    #[test]
    fn test_extract_kid_valid_header() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-2024-01"}"#);
        assert_eq!(extract_kid(&token).unwrap(), "key-2024-01");
    }

    #[test]
    fn test_extract_kid_missing_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);
        assert_eq!(extract_kid(&token).unwrap_err(), VerifyError::MissingKeyId);
    }

    #[test]
    fn test_extract_kid_empty_kid() {
        let token = token_with_header(r#"{"alg":"RS256","kid":""}"#);
        assert_eq!(extract_kid(&token).unwrap_err(), VerifyError::MissingKeyId);
    }

    #[test]
    fn test_extract_kid_non_string_kid() {
        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);
        assert_eq!(extract_kid(&token).unwrap_err(), VerifyError::MissingKeyId);
    }

    #[test]
    fn test_extract_kid_wrong_segment_count() {
        assert_eq!(
            extract_kid("only.two").unwrap_err(),
            VerifyError::MalformedToken
        );
        assert_eq!(
            extract_kid("a.b.c.d").unwrap_err(),
            VerifyError::MalformedToken
        );
        assert_eq!(extract_kid("").unwrap_err(), VerifyError::MalformedToken);
    }

    #[test]
    fn test_extract_kid_invalid_base64_header() {
        assert_eq!(
            extract_kid("!!!bad!!!.payload.signature").unwrap_err(),
            VerifyError::MalformedToken
        );
    }

    #[test]
    fn test_extract_kid_header_not_json() {
        let token = token_with_header("not json");
        assert_eq!(extract_kid(&token).unwrap_err(), VerifyError::MalformedToken);
    }

    #[test]
    fn test_extract_kid_oversized_token() {
        let token = "a".repeat(MAX_TOKEN_SIZE_BYTES + 1);
        assert_eq!(extract_kid(&token).unwrap_err(), VerifyError::MalformedToken);
    }

    #[test]
    fn test_lookup_errors_map_unchanged() {
        assert_eq!(
            VerifyError::from(LookupError::UnknownKey),
            VerifyError::UnknownKey
        );
        assert_eq!(
            VerifyError::from(LookupError::KeyExpired),
            VerifyError::KeyExpired
        );
    }

    #[test]
    fn test_time_claims_absent_pass() {
        let claims = ClaimSet::new();
        assert!(validate_time_claims(&claims, Utc::now()).is_ok());
    }

    #[test]
    fn test_time_claims_exp_in_past_fails() {
        let now: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        let mut claims = ClaimSet::new();
        claims.insert("exp".into(), (now.timestamp() - 1).into());

        assert_eq!(
            validate_time_claims(&claims, now).unwrap_err(),
            VerifyError::ClaimsExpired
        );
    }

    #[test]
    fn test_time_claims_exp_at_now_fails() {
        let now: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        let mut claims = ClaimSet::new();
        claims.insert("exp".into(), now.timestamp().into());

        assert_eq!(
            validate_time_claims(&claims, now).unwrap_err(),
            VerifyError::ClaimsExpired
        );
    }

    #[test]
    fn test_time_claims_future_exp_passes() {
        let now: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        let mut claims = ClaimSet::new();
        claims.insert("exp".into(), (now.timestamp() + 3600).into());

        assert!(validate_time_claims(&claims, now).is_ok());
    }

    #[test]
    fn test_time_claims_nbf_in_future_fails() {
        let now: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        let mut claims = ClaimSet::new();
        claims.insert("nbf".into(), (now.timestamp() + 60).into());

        assert_eq!(
            validate_time_claims(&claims, now).unwrap_err(),
            VerifyError::ClaimsExpired
        );
    }

    #[test]
    fn test_time_claims_nbf_reached_passes() {
        let now: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        let mut claims = ClaimSet::new();
        claims.insert("nbf".into(), now.timestamp().into());

        assert!(validate_time_claims(&claims, now).is_ok());
    }

    #[test]
    fn test_verify_unknown_key_with_empty_directory() {
        let verifier = TokenVerifier::new(Arc::new(KeyDirectory::new()));
        let token = token_with_header(r#"{"alg":"RS256","kid":"k1"}"#);

        assert_eq!(
            verifier.verify(&token, Utc::now()).unwrap_err(),
            VerifyError::UnknownKey
        );
    }

    #[test]
    fn test_verify_missing_kid_regardless_of_directory() {
        let verifier = TokenVerifier::new(Arc::new(KeyDirectory::new()));
        let token = token_with_header(r#"{"alg":"RS256"}"#);

        assert_eq!(
            verifier.verify(&token, Utc::now()).unwrap_err(),
            VerifyError::MissingKeyId
        );
    }
}
