//! SSE Event Decoder
//!
//! Reduces one framed line to either a JSON payload candidate or nothing.
//! Only the `data:` field matters for chat-completion streams; the terminal
//! `[DONE]` sentinel is a normal end marker, not an error.
//!
//! Lines without the `data:` prefix are still handed back as payloads.
//! Some backends stream bare JSON lines, and dropping them would lose output.

/// SSE data field prefix
pub const DATA_PREFIX: &str = "data:";

/// Terminal sentinel sent by OpenAI-compatible backends
pub const DONE_SENTINEL: &str = "[DONE]";

/// Result of decoding one line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Candidate JSON payload
    Payload(&'a str),
    /// Blank keep-alive, separator or end sentinel
    Skip,
}

/// Decode one line of an SSE body
#[must_use]
pub fn decode_line(line: &str) -> SseLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return SseLine::Skip;
    }

    let payload = match trimmed.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim(),
        None => trimmed,
    };

    if payload == DONE_SENTINEL {
        SseLine::Skip
    } else {
        SseLine::Payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_line() {
        assert_eq!(
            decode_line(r#"data: {"choices":[]}"#),
            SseLine::Payload(r#"{"choices":[]}"#)
        );
    }

    #[test]
    fn test_data_line_without_space() {
        assert_eq!(decode_line("data:{}"), SseLine::Payload("{}"));
    }

    #[test]
    fn test_blank_and_whitespace_lines_skip() {
        assert_eq!(decode_line(""), SseLine::Skip);
        assert_eq!(decode_line("   \r"), SseLine::Skip);
    }

    #[test]
    fn test_done_sentinel_skips() {
        assert_eq!(decode_line("data: [DONE]"), SseLine::Skip);
        assert_eq!(decode_line("data:[DONE]\r"), SseLine::Skip);
        assert_eq!(decode_line("[DONE]"), SseLine::Skip);
    }

    #[test]
    fn test_unprefixed_line_is_payload() {
        assert_eq!(decode_line(r#"  {"a":1}  "#), SseLine::Payload(r#"{"a":1}"#));
    }

    #[test]
    fn test_comment_line_is_still_a_candidate() {
        // Comments are not special-cased; the JSON parse rejects them later
        assert_eq!(
            decode_line(": OPENROUTER PROCESSING"),
            SseLine::Payload(": OPENROUTER PROCESSING")
        );
    }

    #[test]
    fn test_empty_data_field_is_empty_payload() {
        assert_eq!(decode_line("data:"), SseLine::Payload(""));
    }
}
