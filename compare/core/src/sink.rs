//! Output Sink
//!
//! The single synchronization point of a comparison. Every worker holds a
//! clone of [`OutputSink`] and appends whole [`OutputRecord`]s to one bounded
//! channel; one consumer drains it through [`RecordStream`]. Records are
//! never split, so concurrent writers cannot interleave partial lines.
//!
//! ```text
//!   worker(m1) ─┐
//!   worker(m2) ─┼──► mpsc ──► RecordStream ──► NDJSON bytes
//!   worker(m3) ─┘
//! ```

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;

use crate::error::SinkError;
use crate::messages::OutputRecord;

/// Writer half of the merged output stream
#[derive(Clone, Debug)]
pub struct OutputSink {
    tx: mpsc::Sender<OutputRecord>,
    closed: Arc<AtomicBool>,
}

impl OutputSink {
    /// Create a sink and its consumer with room for `capacity` queued records
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, RecordStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let stream = RecordStream {
            inner: ReceiverStream::new(rx),
            cancel_guard: None,
        };
        (sink, stream)
    }

    /// Append one record
    ///
    /// Waits while the channel is full. Fails once the sink has been closed
    /// or the consumer has been dropped.
    pub async fn write(&self, record: OutputRecord) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.tx.send(record).await.map_err(|_| SinkError::Closed)
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Close the sink for every handle and release this one
    ///
    /// The consumer sees end-of-stream once the remaining handles are gone.
    /// Closing a sink some other handle already closed is harmless.
    pub fn close(self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("output sink closed");
        }
    }
}

/// Reader half of the merged output stream
pub struct RecordStream {
    inner: ReceiverStream<OutputRecord>,
    /// Cancels the producing invocation when the reader goes away
    cancel_guard: Option<DropGuard>,
}

impl RecordStream {
    /// Attach a guard that fires when this stream is dropped
    #[must_use]
    pub(crate) fn cancel_on_drop(mut self, guard: DropGuard) -> Self {
        self.cancel_guard = Some(guard);
        self
    }

    /// Render every record as one NDJSON line, ready for an HTTP body
    pub fn into_ndjson(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        self.filter_map(|record| async move {
            match record.to_ndjson() {
                Ok(line) => Some(Ok(Bytes::from(line))),
                Err(e) => {
                    tracing::error!(error = %e, model = record.model(), "Failed to encode record");
                    None
                }
            }
        })
    }

    /// Drain the whole stream into a vector
    pub async fn collect_all(self) -> Vec<OutputRecord> {
        self.collect().await
    }
}

impl Stream for RecordStream {
    type Item = OutputRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("cancel_on_drop", &self.cancel_guard.is_some())
            .finish_non_exhaustive()
    }
}
