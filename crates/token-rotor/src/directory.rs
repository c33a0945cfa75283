//! Concurrency-safe signing key directory.
//!
//! The directory is the single source of truth consulted by verification.
//! It is written exclusively by the rotation ingestor and read by
//! arbitrarily many concurrent verification calls, so the contract is
//! single-writer/multi-reader: lookups proceed without blocking each other,
//! and an upsert holds the write lock only for the map insert itself.
//!
//! Records are stored behind `Arc`, so a lookup hands out a complete,
//! immutable snapshot - a reader can never observe a half-written record,
//! and a replace makes the old record unreachable for subsequent lookups
//! without invalidating snapshots already handed out.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::KeyRecord;

/// Why a key lookup did not yield a usable record.
///
/// The two variants carry different operational meaning (key-distribution
/// lag vs. a rotation that happened on schedule) and must not be coalesced.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// No record exists for the requested key id.
    #[error("no signing key with the requested id")]
    UnknownKey,

    /// A record exists but the requested time falls outside its validity
    /// window. The record stays in the directory; expiry is a lookup-time
    /// policy check, not an eviction.
    #[error("signing key is outside its validity window")]
    KeyExpired,
}

/// Mapping from key id to signing key record.
///
/// Created empty at process start, populated only by the rotation ingestor,
/// and dropped with the process. Entries are never deleted; rotation
/// replaces them wholesale (last write wins).
#[derive(Debug, Default)]
pub struct KeyDirectory {
    keys: RwLock<HashMap<String, Arc<KeyRecord>>>,
}

impl KeyDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or atomically replace the entry for `record.key_id`.
    ///
    /// Upserting the same record twice is observably identical to once.
    /// Lookups already in flight may see either the old or the new record,
    /// never a mixture of their fields; once this returns, all subsequent
    /// lookups observe the new record.
    pub fn upsert(&self, record: KeyRecord) {
        let key_id = record.key_id.clone();
        let replaced = self
            .keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key_id.clone(), Arc::new(record))
            .is_some();

        tracing::debug!(
            target: "token_rotor.directory",
            key_id = %key_id,
            replaced = replaced,
            "signing key upserted"
        );
    }

    /// Return the record for `key_id` usable at `at`.
    ///
    /// # Errors
    ///
    /// - [`LookupError::UnknownKey`] if no record exists for `key_id`.
    /// - [`LookupError::KeyExpired`] if a record exists but `at` falls
    ///   outside `[generation_date, expiration_date]`.
    pub fn lookup(&self, key_id: &str, at: DateTime<Utc>) -> Result<Arc<KeyRecord>, LookupError> {
        let record = self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key_id)
            .cloned()
            .ok_or(LookupError::UnknownKey)?;

        if at < record.generation_date || at > record.expiration_date {
            tracing::debug!(
                target: "token_rotor.directory",
                key_id = %key_id,
                at = %at,
                expiration_date = %record.expiration_date,
                "signing key outside validity window"
            );
            return Err(LookupError::KeyExpired);
        }

        Ok(record)
    }

    /// Number of records currently stored, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the directory holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
