//! Axum middleware wiring token verification into request handling.
//!
//! Reads the `Authorization: JWT <token>` header, verifies the token at the
//! current instant, and stores the claim mapping in request extensions for
//! downstream handlers. Failures map to status codes per the contract with
//! the calling layer: a missing header is unauthenticated, a structurally
//! broken header or token is a bad request, and every verification failure
//! is unauthenticated with a deliberately generic message.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::verifier::{ClaimSet, TokenVerifier, VerifyError};

/// Authorization scheme prefix expected on the header value.
const AUTH_SCHEME_PREFIX: &str = "JWT ";

/// Shared state for the verification middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Verifier consulted for every request.
    pub verifier: TokenVerifier,
}

impl AuthState {
    /// Create middleware state around a verifier.
    #[must_use]
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }
}

/// Verified claims inserted into request extensions on success.
#[derive(Debug, Clone)]
pub struct VerifiedClaims(pub ClaimSet);

/// Why a request was rejected before reaching its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No `Authorization` header on the request.
    MissingCredentials,

    /// The header value does not carry the expected `JWT ` scheme prefix.
    BadAuthorizationScheme,

    /// The token itself failed verification.
    Verification(VerifyError),
}

impl From<VerifyError> for AuthRejection {
    fn from(err: VerifyError) -> Self {
        Self::Verification(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthRejection::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_MISSING",
                "Authorization header is required",
            ),
            AuthRejection::BadAuthorizationScheme => (
                StatusCode::BAD_REQUEST,
                "BAD_AUTHORIZATION_HEADER",
                "Authorization header must use the JWT scheme",
            ),
            AuthRejection::Verification(VerifyError::MalformedToken) => (
                StatusCode::BAD_REQUEST,
                "MALFORMED_TOKEN",
                "The access token is not a well-formed signed token",
            ),
            AuthRejection::Verification(VerifyError::MissingKeyId) => (
                StatusCode::BAD_REQUEST,
                "MISSING_KEY_ID",
                "The access token header carries no key id",
            ),
            // Unknown key, expired key, bad signature, and expired claims all
            // collapse to one generic unauthenticated message on the wire;
            // the distinction stays in logs and in the typed error.
            AuthRejection::Verification(_) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "The access token is invalid or expired",
            ),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        });

        (status, body).into_response()
    }
}

/// Middleware that verifies the request's bearer token.
///
/// On success the decoded [`VerifiedClaims`] are available to downstream
/// handlers via request extensions.
///
/// # Errors
///
/// Returns an [`AuthRejection`] that renders the status mapping described in
/// the module docs.
pub async fn verify_request(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthRejection::MissingCredentials)?;

    let token = header
        .strip_prefix(AUTH_SCHEME_PREFIX)
        .ok_or(AuthRejection::BadAuthorizationScheme)?;

    let claims = state.verifier.verify(token, Utc::now()).map_err(|e| {
        debug!(
            target: "token_rotor.middleware",
            error = %e,
            "request token rejected"
        );
        AuthRejection::from(e)
    })?;

    req.extensions_mut().insert(VerifiedClaims(claims));

    Ok(next.run(req).await)
}
