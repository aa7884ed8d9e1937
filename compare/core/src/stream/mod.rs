//! Upstream Stream Decoding
//!
//! The three stateless-or-nearly-so stages every worker runs its upstream
//! body through:
//!
//! ```text
//! bytes ──► LineFramer ──► decode_line ──► serde_json ──► extract_delta ──► text
//!           (per worker)   (Payload/Skip)                 (delta/message)
//! ```

mod delta;
mod framer;
mod sse;

pub use delta::extract_delta;
pub use framer::LineFramer;
pub use sse::{decode_line, SseLine, DATA_PREFIX, DONE_SENTINEL};
