//! Chat Backend Trait
//!
//! Abstraction over an upstream chat-completion provider. The fan-out only
//! needs one thing from a backend: open a streaming completion for a model
//! and hand back the raw body bytes. Everything after that (framing, SSE,
//! JSON, delta extraction) is shared and lives in [`crate::stream`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::UpstreamError;
use crate::messages::BackendRequest;

/// Raw body of a streaming completion, chunked however the network delivered it
pub type ByteStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Upstream chat-completion provider
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs (e.g. "OpenRouter")
    fn name(&self) -> &str;

    /// Whether the process-wide credential is present
    ///
    /// Comparisons are refused up front when this returns `false`.
    fn has_credentials(&self) -> bool {
        true
    }

    /// Open a streaming completion of `request` on `model`
    ///
    /// Errors returned here mean no output at all was produced for `model`.
    async fn open_stream(
        &self,
        request: &BackendRequest,
        model: &str,
    ) -> Result<ByteStream, UpstreamError>;
}
