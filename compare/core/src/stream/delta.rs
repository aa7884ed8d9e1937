//! Delta Extractor
//!
//! Pulls the incremental text out of one parsed chat-completion event.
//! Streaming backends put it in `choices[0].delta.content`; a few send the
//! whole message in `choices[0].message.content` instead.

use serde_json::Value;

/// Extract the text carried by one event, or `""` when there is none
#[must_use]
pub fn extract_delta(payload: &Value) -> &str {
    let choice = payload.pointer("/choices/0");

    let text_at = |field: &str| {
        choice
            .and_then(|c| c.get(field))
            .and_then(|f| f.get("content"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    text_at("delta").or_else(|| text_at("message")).unwrap_or("")
}
