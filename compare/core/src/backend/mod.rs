//! LLM Backend Integration
//!
//! Upstream chat-completion providers behind a common trait.
//!
//! # Available Backends
//!
//! - **OpenAI-compatible**: any `/chat/completions` SSE endpoint (OpenRouter by default)
//!
//! # Usage
//!
//! ```ignore
//! use compare_core::backend::{ChatBackend, OpenAiCompatibleBackend};
//!
//! let backend = OpenAiCompatibleBackend::new(&config.upstream)?;
//! let body = backend.open_stream(&request, "openai/gpt-5").await?;
//! ```

mod openai;
mod traits;

pub use openai::OpenAiCompatibleBackend;
pub use traits::{ByteStream, ChatBackend};
