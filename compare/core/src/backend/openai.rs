//! OpenAI-Compatible Backend
//!
//! Streams chat completions from any endpoint speaking the OpenAI
//! `/chat/completions` dialect. The default base URL points at OpenRouter,
//! which routes each model id (`openai/gpt-5`, `anthropic/claude-4-sonnet`,
//! ...) to its provider behind one credential.
//!
//! # Request
//!
//! ```text
//! POST {base_url}/chat/completions
//! Authorization: Bearer <api key>
//! HTTP-Referer: <caller referer>
//! X-Title: <app title>
//!
//! {"model": "...", "messages": [...], "stream": true, "temperature": 0.7, "max_tokens": 512}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Serialize;

use super::traits::{ByteStream, ChatBackend};
use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::messages::{BackendRequest, ChatMessage};

/// Body of a streaming chat-completion request
#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// OpenAI-compatible streaming client
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    /// Base URL without trailing slash (e.g. `https://openrouter.ai/api/v1`)
    base_url: String,
    /// Bearer credential
    api_key: Option<String>,
    /// Sent as `X-Title`
    app_title: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    /// Create a backend from upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            app_title: config.app_title.clone(),
            http_client: builder.build()?,
        })
    }

    /// Chat completions endpoint URL
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("app_title", &self.app_title)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "OpenAI-compatible"
    }

    fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn open_stream(
        &self,
        request: &BackendRequest,
        model: &str,
    ) -> Result<ByteStream, UpstreamError> {
        let body = ChatCompletionBody {
            model,
            messages: &request.messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http_request = self
            .http_client
            .post(self.completions_url())
            .header("HTTP-Referer", request.referer.as_deref().unwrap_or(""))
            .header("X-Title", &self.app_title)
            .json(&body);

        if let Some(ref key) = self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| UpstreamError::connect(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("upstream error").to_string()
            } else {
                text
            };
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        if is_null_body_status(status) {
            return Err(UpstreamError::MissingBody);
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpstreamError::stream(&e)))
            .boxed())
    }
}

/// Success statuses that never carry a body
fn is_null_body_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
}
