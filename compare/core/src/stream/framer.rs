//! Line Framer
//!
//! Turns arbitrarily split network reads into complete text lines. Two kinds
//! of state survive between reads: bytes of a UTF-8 sequence that was cut in
//! half, and decoded text after the last line terminator. A byte order mark
//! at the very start of the body is dropped.

/// Incremental UTF-8 decoder and line splitter for one upstream body
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Undecoded tail (an incomplete multi-byte sequence)
    pending: Vec<u8>,
    /// Decoded text not yet terminated by `\n`
    buffer: String,
    /// Whether the first decoded character has been checked for a BOM
    bom_checked: bool,
}

impl LineFramer {
    /// Create an empty framer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, in order
    ///
    /// Line terminators are not included. The trailing unterminated segment
    /// stays buffered until a later chunk completes it or [`finish`] is called.
    ///
    /// [`finish`]: LineFramer::finish
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let Some(last) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete[..last].split('\n').map(str::to_owned).collect()
    }

    /// Flush whatever is left once the body is exhausted
    ///
    /// Returns `None` when nothing is buffered. A dangling partial UTF-8
    /// sequence is decoded as U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&pending));
        }

        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> &str {
        &self.buffer
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = input.split_at(err.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));

                    match err.error_len() {
                        // Invalid sequence: replace and keep going
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        // Truncated sequence: wait for the next chunk
                        None => {
                            input = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = input.to_vec();
        self.strip_bom();
    }

    fn strip_bom(&mut self) {
        if self.bom_checked || self.buffer.is_empty() {
            return;
        }
        self.bom_checked = true;
        if self.buffer.starts_with('\u{FEFF}') {
            self.buffer.drain(..'\u{FEFF}'.len_utf8());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_complete_lines_in_one_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"data: a\ndata: b\n");
        assert_eq!(lines, vec!["data: a", "data: b"]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_partial_line_is_carried_over() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"data: {\"cho"), Vec::<String>::new());
        assert_eq!(framer.buffered(), "data: {\"cho");

        let lines = framer.feed(b"ices\":[]}\nda");
        assert_eq!(lines, vec!["data: {\"choices\":[]}"]);
        assert_eq!(framer.buffered(), "da");
    }

    #[test]
    fn test_blank_lines_are_preserved() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"data: x\n\n");
        assert_eq!(lines, vec!["data: x", ""]);
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"data: x\r"), Vec::<String>::new());
        assert_eq!(framer.feed(b"\n"), vec!["data: x\r"]);
    }

    #[test]
    fn test_multibyte_sequence_split_across_chunks() {
        let text = "héllo 🌍\n";
        let bytes = text.as_bytes();
        // Split inside the four-byte emoji and inside the two-byte é
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        lines.extend(framer.feed(&bytes[..2]));
        lines.extend(framer.feed(&bytes[2..8]));
        lines.extend(framer.feed(&bytes[8..]));

        assert_eq!(lines, vec!["héllo 🌍"]);
    }

    #[test]
    fn test_every_split_point_reassembles() {
        let text = "data: ünïcödé ✓\ndata: done\n";
        let bytes = text.as_bytes();

        for split in 0..=bytes.len() {
            let mut framer = LineFramer::new();
            let mut lines = framer.feed(&bytes[..split]);
            lines.extend(framer.feed(&bytes[split..]));
            assert_eq!(lines, vec!["data: ünïcödé ✓", "data: done"], "split at {split}");
            assert_eq!(framer.finish(), None);
        }
    }

    #[test]
    fn test_invalid_bytes_become_replacement_characters() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"a\xffb\n");
        assert_eq!(lines, vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_finish_flushes_residual_text() {
        let mut framer = LineFramer::new();
        framer.feed(b"line\ntail");
        assert_eq!(framer.finish(), Some("tail".to_string()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_finish_with_truncated_sequence() {
        let mut framer = LineFramer::new();
        // First two bytes of a three-byte character
        framer.feed(&"€".as_bytes()[..2]);
        assert_eq!(framer.finish(), Some("\u{FFFD}".to_string()));
    }

    #[test]
    fn test_leading_bom_is_dropped() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\xEF\xBB\xBFdata: a\n");
        assert_eq!(lines, vec!["data: a"]);
    }

    #[test]
    fn test_leading_bom_split_byte_by_byte() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"\xEF").is_empty());
        assert!(framer.feed(b"\xBB").is_empty());
        assert!(framer.feed(b"\xBF").is_empty());
        assert_eq!(framer.buffered(), "");
        assert_eq!(framer.feed(b"data: a\n"), vec!["data: a"]);
    }

    #[test]
    fn test_bom_after_start_is_kept() {
        let mut framer = LineFramer::new();
        let lines = framer.feed("x\n\u{FEFF}y\n".as_bytes());
        assert_eq!(lines, vec!["x", "\u{FEFF}y"]);
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"").is_empty());
        assert_eq!(framer.finish(), None);
    }
}
