//! Bearer-token verification against a rotating set of signing keys.
//!
//! A background task ingests key-rotation announcements from an event stream
//! and keeps an in-memory [`KeyDirectory`] current, while request-handling
//! code concurrently resolves keys by id and verifies token signatures
//! against them. The directory is the single piece of shared mutable state:
//! one writer (the ingestor), arbitrarily many readers (verification calls).
//!
//! # Components
//!
//! - [`record`] - signing key data model and the rotation-event wire format
//! - [`directory`] - concurrency-safe key id → key record store
//! - [`source`] - transport-agnostic rotation announcement source
//! - [`ingestor`] - long-lived task applying rotation events to the directory
//! - [`verifier`] - request-path token verification
//! - [`middleware`] - axum integration mapping failures to HTTP responses

#![warn(clippy::pedantic)]

/// Module for the concurrency-safe signing key store
pub mod directory;

/// Module for the rotation-event ingestion task
pub mod ingestor;

/// Module for axum request middleware
pub mod middleware;

/// Module for the key record and rotation event data model
pub mod record;

/// Module for the rotation-event source abstraction
pub mod source;

/// Module for token verification
pub mod verifier;

pub use directory::{KeyDirectory, LookupError};
pub use ingestor::{spawn_rotation_ingestor, IngestorHandle};
pub use middleware::{verify_request, AuthRejection, AuthState, VerifiedClaims};
pub use record::{KeyRecord, MalformedEvent, RotationEvent};
pub use source::{ChannelSource, RotationEventSource, SourceError};
pub use verifier::{ClaimSet, TokenVerifier, VerifyError};
