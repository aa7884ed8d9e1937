//! Compare Core - Multi-Model Streaming Comparison Engine
//!
//! Sends one conversation to several chat-completion models at once and merges
//! their streamed answers into a single newline-delimited JSON stream. The
//! crate has no HTTP server of its own; `compare-daemon` serves it, and tests
//! drive it directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Caller                                   │
//! │        CompareRequest { messages, models, temperature }          │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                        COMPARE CORE                              │
//! │  ┌───────────────────────────┴────────────────────────────────┐  │
//! │  │                         FanOut                             │  │
//! │  │   ┌────────────┐  ┌────────────┐        ┌────────────┐     │  │
//! │  │   │ worker(m1) │  │ worker(m2) │  ...   │ worker(mN) │     │  │
//! │  │   │  framer    │  │  framer    │        │  framer    │     │  │
//! │  │   │  sse/delta │  │  sse/delta │        │  sse/delta │     │  │
//! │  │   └─────┬──────┘  └─────┬──────┘        └─────┬──────┘     │  │
//! │  │         └───────────────┼─────────────────────┘            │  │
//! │  │                    OutputSink                              │  │
//! │  └─────────────────────────┼──────────────────────────────────┘  │
//! └────────────────────────────┼─────────────────────────────────────┘
//!                              │
//!              RecordStream (chunk / end / error, NDJSON)
//! ```
//!
//! # Key Types
//!
//! - [`FanOut`]: Validates a request and runs one worker per model
//! - [`ChatBackend`]: Upstream streaming provider seam
//! - [`OutputRecord`]: One line of the merged output
//! - [`OutputSink`] / [`RecordStream`]: The merge channel
//! - [`CompareConfig`]: Layered file, environment and CLI configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use compare_core::{
//!     load_config, ChatMessage, CompareRequest, FanOut, FanOutConfig,
//!     OpenAiCompatibleBackend,
//! };
//!
//! let config = load_config()?;
//! let backend = Arc::new(OpenAiCompatibleBackend::new(&config.upstream)?);
//! let fan_out = FanOut::new(backend, FanOutConfig::from(&config));
//!
//! let request = CompareRequest::new(
//!     vec![ChatMessage::user("Explain borrowing in one sentence")],
//!     vec!["openai/gpt-5".into(), "anthropic/claude-4-sonnet".into()],
//! );
//! let mut output = fan_out.compare(request, None)?;
//! while let Some(record) = output.next().await {
//!     println!("{}", record.to_ndjson()?);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Upstream chat-completion backends
//! - [`config`]: Configuration loading and overrides
//! - [`coordinator`]: Fan-out over models, sink lifecycle
//! - [`error`]: Invocation-level and per-backend errors
//! - [`messages`]: Request and output record types
//! - [`sink`]: Merged output channel
//! - [`stream`]: Line framing, SSE decoding, delta extraction
//! - [`worker`]: One backend stream from connect to terminal record

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod messages;
pub mod sink;
pub mod stream;
pub mod worker;

// Re-exports for convenience
pub use backend::{ByteStream, ChatBackend, OpenAiCompatibleBackend};
pub use coordinator::{validate, FanOut, FanOutConfig, WorkerReport};
pub use error::{CompareError, SinkError, UpstreamError};
pub use messages::{
    BackendRequest, ChatMessage, CompareRequest, MessageRole, OutputRecord, StreamOutcome,
};
pub use sink::{OutputSink, RecordStream};
pub use worker::run_worker;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, CompareConfig, CompareToml,
    ConfigError, ConfigOverrides, ConfigSource, ServerConfig, StreamConfig, UpstreamConfig,
};
