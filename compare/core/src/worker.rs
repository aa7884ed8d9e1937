//! Backend Stream Worker
//!
//! Drives one backend from connection to terminal record. A worker never
//! returns an error: whatever goes wrong is written to the sink as an
//! `error` record for its model, and the [`StreamOutcome`] is handed back for
//! logging only. This is what keeps sibling workers independent.
//!
//! # Record Sequence per Model
//!
//! ```text
//! connect failure / rejected status     → error
//! body streamed to exhaustion           → chunk* (error for bad events)* chunk? end
//! body fails mid-stream                 → chunk* error
//! cancelled                             → chunk* (nothing further)
//! ```

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::backend::ChatBackend;
use crate::error::{SinkError, UpstreamError};
use crate::messages::{BackendRequest, OutputRecord, StreamOutcome};
use crate::sink::OutputSink;
use crate::stream::{decode_line, extract_delta, LineFramer, SseLine};

/// Why a worker stopped before emitting `end`
#[derive(Debug)]
enum Interrupt {
    /// Caller cancelled or the consumer went away
    Cancelled,
    /// The backend failed
    Upstream(UpstreamError),
}

impl From<SinkError> for Interrupt {
    fn from(_: SinkError) -> Self {
        Self::Cancelled
    }
}

impl From<UpstreamError> for Interrupt {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

/// Writes one model's records and keeps its counters
struct Emitter<'a> {
    model: &'a str,
    sink: &'a OutputSink,
    chunks: usize,
    decode_errors: usize,
}

impl<'a> Emitter<'a> {
    fn new(model: &'a str, sink: &'a OutputSink) -> Self {
        Self {
            model,
            sink,
            chunks: 0,
            decode_errors: 0,
        }
    }

    async fn chunk(&mut self, text: impl Into<String>) -> Result<(), SinkError> {
        self.chunks += 1;
        self.sink.write(OutputRecord::chunk(self.model, text)).await
    }

    /// Handle one framed line: skip, emit its delta, or report it as undecodable
    async fn line(&mut self, line: &str) -> Result<(), SinkError> {
        let SseLine::Payload(payload) = decode_line(line) else {
            return Ok(());
        };

        match serde_json::from_str::<Value>(payload) {
            Ok(event) => {
                let text = extract_delta(&event);
                if !text.is_empty() {
                    self.chunk(text).await?;
                }
                Ok(())
            }
            Err(e) => {
                self.decode_errors += 1;
                warn!(model = self.model, error = %e, "Undecodable upstream event");
                self.sink
                    .write(OutputRecord::error(
                        self.model,
                        format!("Failed to parse event: {e}"),
                    ))
                    .await
            }
        }
    }
}

/// Stream one model's completion into the sink
///
/// Always terminates normally. Holds its own sink handle, which is released
/// when the worker finishes.
pub async fn run_worker(
    backend: Arc<dyn ChatBackend>,
    request: Arc<BackendRequest>,
    model: String,
    sink: OutputSink,
    cancel: CancellationToken,
) -> StreamOutcome {
    let span = tracing::info_span!("worker", model = %model, backend = backend.name());

    async {
        let mut emitter = Emitter::new(&model, &sink);
        let result = stream_model(backend.as_ref(), &request, &cancel, &mut emitter).await;
        let (chunks, decode_errors) = (emitter.chunks, emitter.decode_errors);

        let outcome = match result {
            Ok(()) => StreamOutcome::Completed,
            Err(Interrupt::Cancelled) => StreamOutcome::Cancelled,
            Err(Interrupt::Upstream(err)) => {
                let outcome = match &err {
                    UpstreamError::Rejected { status, body } => StreamOutcome::UpstreamRejected {
                        status: *status,
                        body: body.clone(),
                    },
                    other => StreamOutcome::Failed(other.to_string()),
                };
                warn!(error = %err, "Upstream failed");

                match sink.write(OutputRecord::error(&model, err.to_string())).await {
                    Ok(()) => outcome,
                    Err(SinkError::Closed) => StreamOutcome::Cancelled,
                }
            }
        };

        info!(%outcome, chunks, decode_errors, "Worker finished");
        outcome
    }
    .instrument(span)
    .await
}

async fn stream_model(
    backend: &dyn ChatBackend,
    request: &BackendRequest,
    cancel: &CancellationToken,
    emitter: &mut Emitter<'_>,
) -> Result<(), Interrupt> {
    let model = emitter.model;

    let mut body = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Interrupt::Cancelled),
        opened = backend.open_stream(request, model) => opened?,
    };
    debug!("Upstream stream opened");

    let mut framer = LineFramer::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Interrupt::Cancelled),
            next = body.next() => next,
        };

        let Some(chunk) = next else {
            break;
        };
        for line in framer.feed(&chunk?) {
            emitter.line(&line).await?;
        }
    }
    drop(body);

    // A final segment without a terminator is passed through as text
    if let Some(rest) = framer.finish() {
        debug!(len = rest.len(), "Flushing unterminated tail");
        emitter.chunk(rest).await?;
    }

    emitter.sink.write(OutputRecord::end(model)).await?;
    Ok(())
}
