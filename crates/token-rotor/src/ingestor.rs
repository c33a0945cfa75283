//! Background ingestion of rotation events into the key directory.
//!
//! One dedicated task, started once at process initialization, pulls
//! announcements off a [`RotationEventSource`] and applies them to the
//! [`KeyDirectory`] in arrival order. It is the directory's only writer.
//!
//! A malformed payload is logged and skipped - one bad announcement must not
//! stop future rotations from applying. Source closure or a transport
//! failure terminates the loop; the task does not reconnect.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::directory::KeyDirectory;
use crate::record::RotationEvent;
use crate::source::{RotationEventSource, SourceError};

/// Owned handle to the running ingestion task.
///
/// Dropping the handle leaves the task running for the process lifetime;
/// call [`shutdown`](Self::shutdown) to stop it cleanly.
pub struct IngestorHandle {
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl IngestorHandle {
    /// Signal shutdown and wait for the task to finish.
    ///
    /// Unblocks a `next()` call pending inside the task, closes the source,
    /// and joins. No applied rotation is lost: an upsert only ever happens
    /// after a payload has been fully received.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(
                target: "token_rotor.ingestor",
                error = %e,
                "ingestion task did not shut down cleanly"
            );
        }
    }

    /// Whether the ingestion loop has already terminated on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the rotation ingestion task.
///
/// The task runs until the source reports closure, a transport failure
/// occurs, or [`IngestorHandle::shutdown`] is called.
pub fn spawn_rotation_ingestor<S>(source: S, directory: Arc<KeyDirectory>) -> IngestorHandle
where
    S: RotationEventSource + 'static,
{
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(ingest_loop(source, directory, shutdown.clone()));

    IngestorHandle { task, shutdown }
}

/// The ingestion loop proper: receive, parse, upsert, repeat.
///
/// The only suspension point is waiting for the next announcement; parsing
/// and the directory upsert are in-memory operations.
async fn ingest_loop<S>(mut source: S, directory: Arc<KeyDirectory>, shutdown: CancellationToken)
where
    S: RotationEventSource,
{
    info!(target: "token_rotor.ingestor", "rotation ingestion started");

    loop {
        let received = tokio::select! {
            () = shutdown.cancelled() => {
                info!(target: "token_rotor.ingestor", "shutdown requested, stopping");
                break;
            }
            received = source.next() => received,
        };

        match received {
            Ok(payload) => match RotationEvent::parse(&payload) {
                Ok(event) => {
                    let record = event.into_record();
                    debug!(
                        target: "token_rotor.ingestor",
                        key_id = %record.key_id,
                        expiration_date = %record.expiration_date,
                        "applying rotation event"
                    );
                    directory.upsert(record);
                }
                Err(e) => {
                    warn!(
                        target: "token_rotor.ingestor",
                        error = %e,
                        payload_bytes = payload.len(),
                        "skipping malformed rotation event"
                    );
                }
            },
            Err(SourceError::Closed) => {
                info!(target: "token_rotor.ingestor", "rotation source closed, stopping");
                break;
            }
            Err(SourceError::Transport(e)) => {
                error!(
                    target: "token_rotor.ingestor",
                    error = %e,
                    "rotation source transport failure, stopping"
                );
                break;
            }
        }
    }

    // Single close point for every exit path; close is idempotent anyway.
    source.close().await;

    info!(
        target: "token_rotor.ingestor",
        keys = directory.len(),
        "rotation ingestion terminated"
    );
}
