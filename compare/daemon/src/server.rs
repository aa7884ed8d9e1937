//! HTTP Server
//!
//! Exposes the fan-out engine over HTTP:
//!
//! ```text
//! POST /api/compare      CompareRequest JSON ──► NDJSON record stream
//! POST /api/openrouter   (alias)
//! GET  /healthz          "ok"
//! ```
//!
//! Request-level failures are answered with a plain-text status before any
//! streaming starts. Once the 200 is sent, every per-model failure arrives
//! inline as an `error` record. A client that disconnects mid-stream drops
//! the body, which cancels the comparison's workers.

use std::future::Future;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use compare_core::coordinator::MISSING_CREDENTIAL;
use compare_core::{CompareError, CompareRequest, FanOut, RecordStream};

/// Content type of the comparison stream
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

/// Shared handler state
#[derive(Clone, Debug)]
struct AppState {
    fan_out: FanOut,
}

/// Build the daemon's routes
pub fn router(fan_out: FanOut) -> Router {
    Router::new()
        .route("/api/compare", post(compare))
        .route("/api/openrouter", post(compare))
        .route("/healthz", get(healthz))
        .with_state(AppState { fan_out })
}

/// Serve `app` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

async fn healthz() -> &'static str {
    "ok"
}

async fn compare(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.fan_out.backend().has_credentials() {
        warn!("Rejecting comparison: no upstream credential configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, MISSING_CREDENTIAL).into_response();
    }

    let request: CompareRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejecting comparison: invalid JSON");
            return (StatusCode::BAD_REQUEST, "Invalid JSON body").into_response();
        }
    };

    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let models = request.models.len();

    match state.fan_out.compare(request, referer) {
        Ok(stream) => {
            info!(models, "Streaming comparison");
            ndjson_response(stream)
        }
        Err(err) => reject(&err),
    }
}

fn ndjson_response(stream: RecordStream) -> Response {
    let mut response = Response::new(Body::from_stream(stream.into_ndjson()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(NDJSON_CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn reject(err: &CompareError) -> Response {
    match err {
        CompareError::Validation(message) => {
            debug!(%message, "Rejecting comparison: invalid request");
            (StatusCode::BAD_REQUEST, message.clone()).into_response()
        }
        CompareError::Configuration(message) => {
            warn!(%message, "Rejecting comparison: configuration");
            (StatusCode::INTERNAL_SERVER_ERROR, message.clone()).into_response()
        }
    }
}
