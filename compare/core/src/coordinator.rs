//! Fan-Out Coordinator
//!
//! Starts one worker per requested model, all writing into a single
//! [`OutputSink`], and closes the sink once every worker has settled.
//!
//! # Invocation Lifecycle
//!
//! ```text
//! compare(request)
//!     │
//!     ├── validate ──────────────► CompareError (nothing started)
//!     ├── credentials? ──────────► CompareError (nothing started)
//!     │
//!     ├── spawn worker(m1) ─┐
//!     ├── spawn worker(m2) ─┼──► OutputSink ──► RecordStream (returned)
//!     ├── spawn worker(mN) ─┘
//!     │
//!     └── join all ──► close sink ──► consumer sees end of stream
//! ```
//!
//! Dropping the returned [`RecordStream`] cancels the invocation: workers stop
//! reading upstream and the sink is still closed.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::backend::ChatBackend;
use crate::config::CompareConfig;
use crate::error::CompareError;
use crate::messages::{BackendRequest, CompareRequest, OutputRecord, StreamOutcome};
use crate::sink::{OutputSink, RecordStream};
use crate::worker::run_worker;

/// Message returned when a request lacks messages or models
pub const MISSING_INPUT: &str = "'messages' and 'models' are required";

/// Message returned when no upstream credential is configured
pub const MISSING_CREDENTIAL: &str = "Missing OPENROUTER_API_KEY";

/// Coordinator settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanOutConfig {
    /// Records buffered between workers and the consumer
    pub channel_capacity: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl From<&CompareConfig> for FanOutConfig {
    fn from(config: &CompareConfig) -> Self {
        Self {
            channel_capacity: config.stream.channel_capacity,
        }
    }
}

/// How one worker of an invocation ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerReport {
    /// Model the worker streamed
    pub model: String,
    /// Terminal state
    pub outcome: StreamOutcome,
}

/// Reject requests that cannot start any worker
pub fn validate(request: &CompareRequest) -> Result<(), CompareError> {
    if request.messages.is_empty() || request.models.is_empty() {
        return Err(CompareError::Validation(MISSING_INPUT.to_string()));
    }
    Ok(())
}

/// Fans one request out to many models of a backend
#[derive(Clone)]
pub struct FanOut {
    backend: Arc<dyn ChatBackend>,
    config: FanOutConfig,
}

impl FanOut {
    /// Create a coordinator over `backend`
    pub fn new(backend: Arc<dyn ChatBackend>, config: FanOutConfig) -> Self {
        Self { backend, config }
    }

    /// The backend every worker streams from
    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Start a comparison and return its merged output
    ///
    /// Must be called from within a Tokio runtime. Fails before any upstream
    /// connection is opened when the request is incomplete or the backend
    /// has no credential.
    pub fn compare(
        &self,
        request: CompareRequest,
        referer: Option<String>,
    ) -> Result<RecordStream, CompareError> {
        validate(&request)?;
        if !self.backend.has_credentials() {
            return Err(CompareError::Configuration(MISSING_CREDENTIAL.to_string()));
        }

        let (sink, stream) = OutputSink::channel(self.config.channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let shared = Arc::new(BackendRequest::from_compare(&request, referer));

        let this = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            this.run(shared, request.models, sink, token).await;
        });

        Ok(stream.cancel_on_drop(cancel.drop_guard()))
    }

    /// Run every worker to completion, then close `sink`
    ///
    /// Duplicate model ids each get their own worker. A worker task that
    /// panics is reported as an `error` record for its model.
    pub async fn run(
        &self,
        request: Arc<BackendRequest>,
        models: Vec<String>,
        sink: OutputSink,
        cancel: CancellationToken,
    ) -> Vec<WorkerReport> {
        let invocation = Uuid::new_v4();
        let span = tracing::info_span!("compare", %invocation, models = models.len());

        async move {
            info!(backend = self.backend.name(), "Starting fan-out");

            let (models, handles): (Vec<_>, Vec<_>) = models
                .into_iter()
                .map(|model| {
                    let worker = run_worker(
                        Arc::clone(&self.backend),
                        Arc::clone(&request),
                        model.clone(),
                        sink.clone(),
                        cancel.clone(),
                    );
                    (model, tokio::spawn(worker.in_current_span()))
                })
                .unzip();

            let results = join_all(handles).await;

            let mut reports = Vec::with_capacity(models.len());
            for (model, result) in models.into_iter().zip(results) {
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(model = %model, error = %e, "Worker task failed");
                        let message = format!("worker task failed: {e}");
                        if sink
                            .write(OutputRecord::error(&model, message.clone()))
                            .await
                            .is_err()
                        {
                            StreamOutcome::Cancelled
                        } else {
                            StreamOutcome::Failed(message)
                        }
                    }
                };
                reports.push(WorkerReport { model, outcome });
            }

            sink.close();

            let completed = reports
                .iter()
                .filter(|r| r.outcome == StreamOutcome::Completed)
                .count();
            info!(
                completed,
                total = reports.len(),
                cancelled = cancel.is_cancelled(),
                "Fan-out finished"
            );
            reports
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ByteStream;
    use crate::error::UpstreamError;
    use crate::messages::ChatMessage;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every model with one delta, except `boom` (panics) and `hang`
    #[derive(Default)]
    struct Stub {
        opened: AtomicUsize,
        no_key: bool,
    }

    #[async_trait]
    impl ChatBackend for Stub {
        fn name(&self) -> &str {
            "Stub"
        }

        fn has_credentials(&self) -> bool {
            !self.no_key
        }

        async fn open_stream(
            &self,
            _request: &BackendRequest,
            model: &str,
        ) -> Result<ByteStream, UpstreamError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            match model {
                "boom" => panic!("backend exploded"),
                "hang" => Ok(futures::stream::pending().boxed()),
                _ => {
                    let line = format!(
                        "data: {{\"choices\":[{{\"delta\":{{\"content\":\"hi from {model}\"}}}}]}}\n"
                    );
                    Ok(futures::stream::iter(vec![Ok(Bytes::from(line))]).boxed())
                }
            }
        }
    }

    fn request(models: &[&str]) -> CompareRequest {
        CompareRequest::new(
            vec![ChatMessage::user("hi")],
            models.iter().map(|m| (*m).to_string()).collect(),
        )
    }

    fn shared() -> Arc<BackendRequest> {
        Arc::new(BackendRequest::from_compare(&request(&[]), None))
    }

    #[test]
    fn test_validate_rejects_empty_inputs() {
        let no_models = CompareRequest::new(vec![ChatMessage::user("hi")], Vec::new());
        let no_messages = CompareRequest::new(Vec::new(), vec!["m1".into()]);

        for bad in [no_models, no_messages, CompareRequest::default()] {
            assert_eq!(
                validate(&bad),
                Err(CompareError::Validation(MISSING_INPUT.to_string()))
            );
        }
        assert_eq!(validate(&request(&["m1"])), Ok(()));
    }

    #[tokio::test]
    async fn test_invalid_request_opens_no_connection() {
        let backend = Arc::new(Stub::default());
        let fan_out = FanOut::new(backend.clone(), FanOutConfig::default());

        let result = fan_out.compare(request(&[]), None);
        assert!(matches!(result, Err(CompareError::Validation(_))));
        assert_eq!(backend.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_configuration_error() {
        let backend = Arc::new(Stub {
            no_key: true,
            ..Stub::default()
        });
        let fan_out = FanOut::new(backend.clone(), FanOutConfig::default());

        let result = fan_out.compare(request(&["m1"]), None);
        assert_eq!(
            result.unwrap_err(),
            CompareError::Configuration(MISSING_CREDENTIAL.to_string())
        );
        assert_eq!(backend.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_models_each_get_a_worker() {
        let fan_out = FanOut::new(Arc::new(Stub::default()), FanOutConfig::default());

        let records = fan_out
            .compare(request(&["m1", "m1"]), None)
            .unwrap()
            .collect_all()
            .await;

        let ends = records
            .iter()
            .filter(|r| **r == OutputRecord::end("m1"))
            .count();
        assert_eq!(ends, 2);
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn test_panicking_worker_becomes_error_record() {
        let fan_out = FanOut::new(Arc::new(Stub::default()), FanOutConfig::default());
        let (sink, stream) = OutputSink::channel(16);

        let reports = fan_out
            .run(
                shared(),
                vec!["boom".into(), "m1".into()],
                sink,
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(reports[0].outcome, StreamOutcome::Failed(_)));
        assert_eq!(reports[1].outcome, StreamOutcome::Completed);

        let records = stream.collect_all().await;
        assert!(records
            .iter()
            .any(|r| matches!(r, OutputRecord::Error { model, .. } if model == "boom")));
        assert!(records.contains(&OutputRecord::end("m1")));
    }

    #[tokio::test]
    async fn test_cancel_stops_hung_worker_and_closes_stream() {
        let fan_out = FanOut::new(Arc::new(Stub::default()), FanOutConfig::default());
        let (sink, stream) = OutputSink::channel(16);
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let fan_out = fan_out.clone();
            let cancel = cancel.clone();
            async move {
                fan_out
                    .run(shared(), vec!["hang".into(), "m1".into()], sink, cancel)
                    .await
            }
        });

        let mut stream = stream;
        assert_eq!(stream.next().await, Some(OutputRecord::chunk("m1", "hi from m1")));
        assert_eq!(stream.next().await, Some(OutputRecord::end("m1")));

        cancel.cancel();
        let reports = run.await.unwrap();
        assert_eq!(
            reports[0],
            WorkerReport {
                model: "hang".into(),
                outcome: StreamOutcome::Cancelled,
            }
        );
        assert_eq!(stream.next().await, None);
    }

    /// Streams one delta then stalls; reports when its body is released
    struct Stall {
        released: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl ChatBackend for Stall {
        fn name(&self) -> &str {
            "Stall"
        }

        async fn open_stream(
            &self,
            _request: &BackendRequest,
            _model: &str,
        ) -> Result<ByteStream, UpstreamError> {
            let guard = self.released.lock().unwrap().take();
            let first = Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n");
            Ok(futures::stream::iter(vec![Ok(first)])
                .chain(futures::stream::pending())
                .map(move |item| {
                    let _held = &guard;
                    item
                })
                .boxed())
        }
    }

    #[tokio::test]
    async fn test_dropping_output_releases_upstream() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let backend = Arc::new(Stall {
            released: std::sync::Mutex::new(Some(tx)),
        });
        let fan_out = FanOut::new(backend, FanOutConfig::default());

        let mut stream = fan_out.compare(request(&["m1"]), None).unwrap();
        assert_eq!(stream.next().await, Some(OutputRecord::chunk("m1", "a")));
        drop(stream);

        let released = tokio::time::timeout(std::time::Duration::from_secs(5), rx).await;
        assert!(matches!(released, Ok(Err(_))), "upstream body was not dropped");
    }
}
