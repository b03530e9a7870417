//! Wire encoding for outgoing IRC lines.
//!
//! Outgoing commands are assembled from a command name and a parameter list
//! in which trailing parameters may be absent (`None`). Encoding:
//!
//! 1. drops absent parameters from the end of the list,
//! 2. rejects a parameter before the last that is absent, empty, starts
//!    with `:` or contains a space,
//! 3. prefixes the last parameter with the `:` sentinel when it is empty,
//!    starts with `:`, or contains a space,
//! 4. joins everything with single spaces and appends the terminator.
//!
//! # Example
//!
//! ```
//! use slirc_proto::encode::{encode_line, Terminator};
//!
//! let line = encode_line(
//!     "PRIVMSG",
//!     vec![Some("#rust".into()), Some("hello there".into()), None],
//!     Terminator::CrLf,
//! )
//! .unwrap();
//! assert_eq!(line, "PRIVMSG #rust :hello there\r\n");
//! ```

use std::io::{self, Write};

use crate::error::ProtocolError;
use crate::message::Message;

/// The IRC line terminator.
pub const CRLF: &str = "\r\n";

/// Line terminator policy for an encoded line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminator {
    /// Append `\r\n` (stream transports).
    #[default]
    CrLf,
    /// No terminator, for transports that frame messages themselves.
    None,
}

impl Terminator {
    fn as_str(self) -> &'static str {
        match self {
            Terminator::CrLf => CRLF,
            Terminator::None => "",
        }
    }
}

/// Whether `param`, in last position, needs the `:` sentinel to survive a
/// round-trip through the wire format.
#[inline]
pub fn needs_trailing_sentinel(param: &str) -> bool {
    param.is_empty() || param.starts_with(':') || param.contains(' ')
}

/// Drop absent parameters from the end of the list.
///
/// Absent parameters in the middle of the list are left in place;
/// [`encode_line`] rejects them.
pub fn trim_absent_params(params: &mut Vec<Option<String>>) {
    while matches!(params.last(), Some(None)) {
        params.pop();
    }
}

/// Prefix the last parameter with `:` if it needs the sentinel.
pub fn escape_trailing(params: &mut [String]) {
    if let Some(last) = params.last_mut() {
        if needs_trailing_sentinel(last) {
            last.insert(0, ':');
        }
    }
}

/// Reject characters that would break framing on the receiving side.
fn check_line_safe(part: &str) -> Result<(), ProtocolError> {
    match part.chars().find(|c| matches!(c, '\r' | '\n' | '\0')) {
        Some(ch) => Err(ProtocolError::IllegalControlChar(ch)),
        None => Ok(()),
    }
}

/// A parameter before the last has no sentinel to protect it, so it must be
/// a single non-empty token.
fn check_middle(index: usize, param: Option<&str>) -> Result<(), ProtocolError> {
    let reason = match param {
        None => "absent",
        Some("") => "empty",
        Some(p) if p.starts_with(':') => "starts with ':'",
        Some(p) if p.contains(' ') => "contains a space",
        Some(_) => return Ok(()),
    };
    Err(ProtocolError::InvalidParameter { index, reason })
}

/// Encode an outgoing command into its exact wire form.
///
/// Fails if the command or a parameter contains CR, LF or NUL, which would
/// smuggle a second line onto the wire, or if a parameter before the last
/// would not decode back as the same single parameter.
pub fn encode_line(
    command: &str,
    mut params: Vec<Option<String>>,
    terminator: Terminator,
) -> Result<String, ProtocolError> {
    check_line_safe(command)?;
    trim_absent_params(&mut params);
    if let Some((_, middle)) = params.split_last() {
        for (index, param) in middle.iter().enumerate() {
            check_middle(index, param.as_deref())?;
        }
    }

    let mut params: Vec<String> = params.into_iter().map(Option::unwrap_or_default).collect();
    for param in &params {
        check_line_safe(param)?;
    }
    escape_trailing(&mut params);

    let mut line = String::with_capacity(
        command.len() + params.iter().map(|p| p.len() + 1).sum::<usize>() + 2,
    );
    line.push_str(command);
    for param in &params {
        line.push(' ');
        line.push_str(param);
    }
    line.push_str(terminator.as_str());

    Ok(line)
}

/// A trait for encoding IRC protocol elements directly to a byte stream.
pub trait IrcEncode {
    /// Encode this value, terminator included, to the given writer.
    ///
    /// Returns the number of bytes written on success.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<usize>;

    /// Encode this value to a new `Vec<u8>`.
    #[must_use]
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(512);
        let _ = self.encode(&mut buf);
        buf
    }
}

impl IrcEncode for Message {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let line = self.to_string();
        w.write_all(line.as_bytes())?;
        w.write_all(CRLF.as_bytes())?;
        Ok(line.len() + CRLF.len())
    }
}
