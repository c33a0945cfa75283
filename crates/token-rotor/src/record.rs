//! Signing key data model and rotation-event wire format.
//!
//! A [`RotationEvent`] is the deserialized form of one message from the
//! rotation announcement stream; a [`KeyRecord`] is the in-memory record the
//! directory stores. Records are immutable after construction: rotation
//! replaces the directory entry wholesale, it never mutates fields in place.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// A rotation-event payload that could not be turned into a key record.
///
/// Carries the reason for logging only; malformed events are skipped by the
/// ingestor and never reach the directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed rotation event: {reason}")]
pub struct MalformedEvent {
    reason: String,
}

impl MalformedEvent {
    /// Human-readable description of what failed to parse.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// One signing key and its validity window.
///
/// Invariant: `expiration_date > generation_date`, enforced at event parse
/// time. A record whose window has passed stays in the directory (so it can
/// still be inspected after expiry) but fails lookup with
/// [`KeyExpired`](crate::directory::LookupError::KeyExpired).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Unique key identifier, matched against the token header `kid`.
    pub key_id: String,

    /// PEM-encoded public key material.
    pub public_key: String,

    /// Start of the validity window.
    pub generation_date: DateTime<Utc>,

    /// End of the validity window.
    pub expiration_date: DateTime<Utc>,
}

/// Wire-level counterpart of [`KeyRecord`], one stream message per event.
///
/// All four fields are required; timestamps are RFC 3339 date-times.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationEvent {
    /// Unique key identifier.
    pub key_id: String,

    /// PEM-encoded public key material.
    pub public_key: String,

    /// Start of the validity window.
    pub generation_date: DateTime<Utc>,

    /// End of the validity window.
    pub expiration_date: DateTime<Utc>,
}

impl RotationEvent {
    /// Parse one raw stream payload into a rotation event.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEvent`] if the payload is not valid JSON, a
    /// required field is missing, a timestamp does not parse as an RFC 3339
    /// date-time, or the validity window is empty or inverted.
    pub fn parse(payload: &[u8]) -> Result<Self, MalformedEvent> {
        let event: Self = serde_json::from_slice(payload).map_err(|e| MalformedEvent {
            reason: e.to_string(),
        })?;

        if event.expiration_date <= event.generation_date {
            return Err(MalformedEvent {
                reason: format!(
                    "expiration_date {} is not after generation_date {}",
                    event.expiration_date, event.generation_date
                ),
            });
        }

        Ok(event)
    }

    /// Convert the event into the record the directory stores.
    #[must_use]
    pub fn into_record(self) -> KeyRecord {
        KeyRecord {
            key_id: self.key_id,
            public_key: self.public_key,
            generation_date: self.generation_date,
            expiration_date: self.expiration_date,
        }
    }
}
