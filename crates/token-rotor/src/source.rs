//! Transport-agnostic source of rotation announcements.
//!
//! [`RotationEventSource`] is the single seam between the ingestion loop and
//! whatever message broker actually delivers rotation events. Any transport
//! satisfying the contract is substitutable; the crate ships
//! [`ChannelSource`], an in-process implementation used for tests and replay.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why the source could not deliver another event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The announcement channel has been shut down. Terminal.
    #[error("rotation event source closed")]
    Closed,

    /// Transport-level failure. Terminal for the ingestion loop; deployments
    /// needing reconnect wrap the source with their own backoff logic.
    #[error("rotation event source transport failure: {0}")]
    Transport(String),
}

/// A connection to an external rotation-announcement channel.
///
/// The ingestor is the only caller and drives the source from a single task,
/// so both operations take `&mut self`.
pub trait RotationEventSource: Send {
    /// Wait until the next raw event payload is available.
    ///
    /// Resolves to [`SourceError::Closed`] once the channel has been shut
    /// down; a task blocked here must be unblocked when that happens.
    fn next(&mut self) -> impl Future<Output = Result<Bytes, SourceError>> + Send;

    /// Release the underlying connection. Idempotent.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// In-process rotation event source backed by a tokio mpsc channel.
///
/// Payloads sent on the paired [`mpsc::Sender`] come out of
/// [`next`](RotationEventSource::next) in order. Dropping the sender (or
/// calling [`close`](RotationEventSource::close)) ends the stream with
/// [`SourceError::Closed`].
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    /// Create a channel-backed source with the given buffer capacity,
    /// returning the sender half alongside it.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

impl RotationEventSource for ChannelSource {
    async fn next(&mut self) -> Result<Bytes, SourceError> {
        self.rx.recv().await.ok_or(SourceError::Closed)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
