//! Chunk framing: turning stream reads into messages.
//!
//! A single read from a stream may carry zero, one or many complete lines and
//! may stop in the middle of a line. [`Frames`] walks one chunk lazily and
//! yields a parsed [`Message`] (or a [`ProtocolError`]) per complete line.
//! It never yields anything for an unterminated tail; instead
//! [`Frames::consumed`] tells the caller how many bytes were fully framed so
//! the tail can be kept for the next read.
//!
//! Lines end with `\r\n`. A bare `\n` is accepted too, since some servers
//! emit it. Empty lines are skipped.
//!
//! ```
//! use slirc_proto::framer::Frames;
//!
//! let chunk = b":host 001 me :Welcome\r\nPING :tok\r\nPRIVMSG #a :par";
//! let mut frames = Frames::new(chunk);
//! let commands: Vec<String> = frames
//!     .by_ref()
//!     .map(|m| m.unwrap().command)
//!     .collect();
//!
//! assert_eq!(commands, ["001", "PING"]);
//! assert_eq!(frames.remainder(), b"PRIVMSG #a :par");
//! ```

use crate::error::{extract_command_hint, ProtocolError};
use crate::message::Message;

/// Maximum IRC line length (8191 bytes as per modern IRC conventions).
pub const MAX_LINE_LEN: usize = 8191;

/// Lazy iterator over the complete lines of one chunk.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Frames<'a> {
    /// Start framing `buf` from its first byte.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes covered by the lines yielded so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes not yet framed. After the iterator is exhausted this is the
    /// unterminated tail (possibly empty).
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let newline = rest.iter().position(|b| *b == b'\n')?;
        self.pos += newline + 1;

        let line = &rest[..newline];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<Message, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.next_line()?;
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(line));
        }
    }
}

/// Frame `chunk` from the start.
///
/// Each call restarts from the first byte; the function holds no state.
pub fn frames(chunk: &[u8]) -> Frames<'_> {
    Frames::new(chunk)
}

/// Parse one line (terminator optional) from raw bytes.
pub fn parse_line(line: &[u8]) -> Result<Message, ProtocolError> {
    if line.len() > MAX_LINE_LEN {
        return Err(ProtocolError::MessageTooLong {
            actual: line.len(),
            limit: MAX_LINE_LEN,
        });
    }

    let text = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidUtf8 {
        raw_line: line.to_vec(),
        byte_pos: e.valid_up_to(),
        details: e.to_string(),
        command_hint: extract_command_hint(line),
    })?;

    text.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MessageParseError;

    #[test]
    fn test_single_complete_line() {
        let mut frames = frames(b":host 001 me :Welcome\r\n");
        let msg = frames.next().unwrap().unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("host"));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["me", "Welcome"]);
        assert!(frames.next().is_none());
        assert_eq!(frames.consumed(), 23);
        assert!(frames.remainder().is_empty());
    }

    #[test]
    fn test_many_lines_in_order() {
        let chunk = b"PING :a\r\nPING :b\r\nPING :c\r\n";
        let tokens: Vec<String> = frames(chunk)
            .map(|m| m.unwrap().params[0].clone())
            .collect();
        assert_eq!(tokens, ["a", "b", "c"]);
    }

    #[test]
    fn test_truncated_tail_yields_nothing() {
        let chunk = b"PING :a\r\nPRIVMSG #chan :hal";
        let mut frames = frames(chunk);
        assert_eq!(frames.next().unwrap().unwrap().command, "PING");
        assert!(frames.next().is_none());
        assert_eq!(frames.consumed(), 9);
        assert_eq!(frames.remainder(), b"PRIVMSG #chan :hal");
    }

    #[test]
    fn test_tail_split_inside_terminator() {
        let mut frames = frames(b"PING :a\r");
        assert!(frames.next().is_none());
        assert_eq!(frames.consumed(), 0);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let chunk = b"\r\n\r\nPING :a\r\n\n";
        let mut frames = frames(chunk);
        assert_eq!(frames.next().unwrap().unwrap().command, "PING");
        assert!(frames.next().is_none());
        assert_eq!(frames.consumed(), chunk.len());
    }

    #[test]
    fn test_bare_lf_accepted() {
        let msg = frames(b"PING :a\n").next().unwrap().unwrap();
        assert_eq!(msg.params, vec!["a"]);
    }

    #[test]
    fn test_malformed_line_is_error_and_framing_continues() {
        let chunk = b":host\r\nPING :after\r\n";
        let mut frames = frames(chunk);
        let err = frames.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidMessage {
                cause: MessageParseError::InvalidCommand,
                ..
            }
        ));
        assert_eq!(frames.next().unwrap().unwrap().command, "PING");
    }

    #[test]
    fn test_invalid_utf8_keeps_command_hint() {
        let chunk = b"PRIVMSG #a :\xff\xfe\r\n";
        match frames(chunk).next().unwrap() {
            Err(ProtocolError::InvalidUtf8 {
                byte_pos,
                command_hint,
                ..
            }) => {
                assert_eq!(byte_pos, 12);
                assert_eq!(command_hint.as_deref(), Some("PRIVMSG"));
            }
            other => panic!("expected InvalidUtf8, got {other:?}"),
        }
    }

    #[test]
    fn test_restartable_per_call() {
        let chunk = b"PING :a\r\n";
        assert_eq!(frames(chunk).count(), 1);
        assert_eq!(frames(chunk).count(), 1);
    }

    #[test]
    fn test_overlong_line() {
        let mut line = vec![b'A'; MAX_LINE_LEN + 1];
        line.extend_from_slice(b"\r\n");
        assert!(matches!(
            frames(&line).next().unwrap(),
            Err(ProtocolError::MessageTooLong { .. })
        ));
    }
}
