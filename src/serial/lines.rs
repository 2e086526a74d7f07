//! Newline splitting for the raw serial byte stream.

use bytes::{Buf, BytesMut};

/// Longest line kept before it is flushed without a newline
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Accumulates bytes and yields complete `\n`-terminated lines.
///
/// Lines are decoded as UTF-8 with invalid sequences replaced. The `\n` is
/// removed; a preceding `\r` is kept so diagnostics see the raw text.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Append bytes read from the transport
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            return Some(String::from_utf8_lossy(&line).into_owned());
        }

        if self.buf.len() >= MAX_LINE_LENGTH {
            let line = self.buf.split_to(MAX_LINE_LENGTH);
            return Some(String::from_utf8_lossy(&line).into_owned());
        }

        None
    }

    /// Take whatever partial line is left (at end of stream)
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_lines_across_chunks() {
        let mut lines = LineBuffer::new();
        lines.extend(b"Topic: g");
        assert_eq!(lines.next_line(), None);

        lines.extend(b"ps\r\n{\"a\":1}\n===");
        assert_eq!(lines.next_line().as_deref(), Some("Topic: gps\r"));
        assert_eq!(lines.next_line().as_deref(), Some("{\"a\":1}"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending(), 3);
        assert_eq!(lines.finish().as_deref(), Some("==="));
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_empty_lines_are_yielded() {
        let mut lines = LineBuffer::new();
        lines.extend(b"\n\n");
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut lines = LineBuffer::new();
        lines.extend(b"RSSI \xff -40\n");
        assert_eq!(lines.next_line().as_deref(), Some("RSSI \u{fffd} -40"));
    }

    #[test]
    fn test_overlong_line_is_flushed() {
        let mut lines = LineBuffer::new();
        lines.extend(&vec![b'x'; MAX_LINE_LENGTH + 10]);

        assert_eq!(lines.next_line().map(|l| l.len()), Some(MAX_LINE_LENGTH));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending(), 10);
    }
}
