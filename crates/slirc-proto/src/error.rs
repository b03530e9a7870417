//! Error types for the IRC protocol library.
//!
//! This module defines error types for framing failures and
//! message parsing failures.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Extract the IRC command name from raw message bytes (for error reporting).
///
/// This function attempts to parse the command from raw bytes without validating UTF-8,
/// allowing extraction of the command name even when the message contains invalid UTF-8.
///
/// The command is the first space-delimited token after the optional prefix (`:...`).
pub(crate) fn extract_command_hint(raw_line: &[u8]) -> Option<String> {
    let mut pos = 0;

    // Skip prefix: :server or :nick!user@host (terminated by space)
    if raw_line.first() == Some(&b':') {
        while pos < raw_line.len() && raw_line[pos] != b' ' {
            pos += 1;
        }
        while pos < raw_line.len() && raw_line[pos] == b' ' {
            pos += 1;
        }
    }

    let cmd_start = pos;
    while pos < raw_line.len() && raw_line[pos].is_ascii_alphanumeric() {
        pos += 1;
    }

    if pos > cmd_start {
        // Safe to decode: the slice is ASCII alphanumeric only
        String::from_utf8(raw_line[cmd_start..pos].to_vec()).ok()
    } else {
        None
    }
}

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Invalid UTF-8 bytes in a line.
    ///
    /// Preserves the raw line and an optional command hint so the caller can
    /// still tell which command was mangled.
    #[error("invalid UTF-8 in message at byte {byte_pos}: {details}")]
    InvalidUtf8 {
        /// The raw line as bytes (before UTF-8 validation failed).
        raw_line: Vec<u8>,
        /// Byte position where UTF-8 validation failed.
        byte_pos: usize,
        /// Detailed error message from the UTF-8 decoder.
        details: String,
        /// Command name extracted from the raw line, if any.
        command_hint: Option<String>,
    },

    /// Line exceeded the maximum allowed length.
    #[error("message too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Actual line length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Illegal control character in an outgoing command or parameter.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// A parameter before the last would lose its boundary on the wire.
    #[error("invalid parameter {index}: {reason}")]
    InvalidParameter {
        /// Position of the offending parameter.
        index: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The invalid message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was invalid or missing.
    #[error("invalid command")]
    InvalidCommand,

    /// Invalid message prefix.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Parsing error with position information.
    #[error("parsing failed at position {position}: {context}")]
    ParseContext {
        /// Character position where parsing failed.
        position: usize,
        /// Description of what was being parsed.
        context: String,
    },
}
