//! # slirc-proto
//!
//! IRC line framing, parsing and wire encoding.
//!
//! ## Features
//!
//! - Chunk framing that tolerates reads ending mid-line ([`framer`])
//! - Line parsing into [`Message`] (prefix, command, parameters)
//! - Outgoing line encoding with trailing-parameter escaping ([`encode`])
//! - Sender nickname extraction from `nick!user@host` prefixes
//!
//! ## Quick Start
//!
//! ```rust
//! use slirc_proto::encode::{encode_line, Terminator};
//! use slirc_proto::Message;
//!
//! let message: Message = ":nick!user@host PRIVMSG #channel :Hello there".parse().unwrap();
//! assert_eq!(message.params, vec!["#channel", "Hello there"]);
//!
//! let line = encode_line("PRIVMSG", vec![Some("#channel".into()), Some("Hi!".into())], Terminator::CrLf)
//!     .unwrap();
//! assert_eq!(line, "PRIVMSG #channel Hi!\r\n");
//! ```
//!
//! ## Acknowledgments
//!
//! This project was inspired by the architectural patterns established by
//! [Aaron Weiss (aatxe)](https://github.com/aatxe) in the
//! [irc](https://github.com/aatxe/irc) crate.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod encode;
pub mod error;
pub mod framer;
pub mod message;

pub use self::encode::{encode_line, IrcEncode, Terminator};
pub use self::error::{MessageParseError, ProtocolError};
pub use self::framer::{frames, parse_line, Frames, MAX_LINE_LEN};
pub use self::message::Message;
