//! Unified error handling for slircc.
//!
//! Every failure the engine observes is classified by the operation that
//! produced it ([`ErrorKind`]) and wrapped with its cause into a
//! [`ClientError`], which is what `error` listeners receive.

use slirc_proto::ProtocolError;
use std::fmt;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

// ============================================================================
// Error kinds
// ============================================================================

/// The operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening the transport.
    Connect,
    /// Reading from the transport or parsing what was read.
    Read,
    /// Encoding or writing an outgoing line.
    Write,
    /// Releasing the transport.
    Close,
}

impl ErrorKind {
    /// Static label used in the error message and in log fields.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Causes
// ============================================================================

/// What went wrong underneath a [`ClientError`].
#[derive(Debug, Error)]
#[allow(clippy::large_enum_variant)] // WebSocket errors are large but rare
pub enum ErrorCause {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    #[error("unable to send message: not connected")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

impl ErrorCause {
    /// Static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Protocol(ProtocolError::InvalidUtf8 { .. }) => "invalid_utf8",
            Self::Protocol(ProtocolError::MessageTooLong { .. }) => "message_too_long",
            Self::Protocol(ProtocolError::IllegalControlChar(_)) => "illegal_control_char",
            Self::Protocol(ProtocolError::InvalidParameter { .. }) => "invalid_parameter",
            Self::Protocol(_) => "invalid_message",
            Self::WebSocket(_) => "websocket",
            Self::NotConnected => "not_connected",
            Self::Other(_) => "other",
        }
    }

    fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io(e) => Some(e.kind()),
            Self::WebSocket(tungstenite::Error::Io(e)) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<String> for ErrorCause {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

impl From<&str> for ErrorCause {
    fn from(message: &str) -> Self {
        Self::Other(message.to_owned())
    }
}

// ============================================================================
// Client error
// ============================================================================

/// A classified engine error, as delivered to `error` listeners.
///
/// Renders as `"<kind>: <cause>"`, e.g. `"connect: connection refused"`.
#[derive(Debug, Error)]
#[error("{kind}: {cause}")]
pub struct ClientError {
    /// Operation that failed.
    pub kind: ErrorKind,
    /// Underlying cause.
    #[source]
    pub cause: ErrorCause,
}

impl ClientError {
    pub fn new(kind: ErrorKind, cause: impl Into<ErrorCause>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    /// Whether this error is expected noise of a transport going away.
    ///
    /// Operations on a handle that is already released (`NotConnected`) and
    /// interrupted reads are absorbed without publication.
    pub fn is_silent(&self) -> bool {
        matches!(
            self.cause.io_kind(),
            Some(io::ErrorKind::NotConnected | io::ErrorKind::Interrupted)
        )
    }

    /// Static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        self.cause.error_code()
    }
}
