//! Message parsing implementation.
//!
//! This module implements `FromStr` for `Message` using the nom-based parser.

use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};

use super::nom_parser::ParsedMessage;
use super::types::Message;

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause: MessageParseError::EmptyMessage,
            });
        }

        let parsed = ParsedMessage::parse(line).map_err(|parse_err| {
            let cause = if parse_err.position == 0 || line[..parse_err.position].ends_with(' ') {
                MessageParseError::InvalidCommand
            } else {
                MessageParseError::ParseContext {
                    position: parse_err.position,
                    context: format!("{:?}", parse_err.kind),
                }
            };
            ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause,
            }
        })?;

        if let Some(prefix) = parsed.prefix {
            if prefix.chars().any(|c| c == '\0' || c.is_control()) {
                return Err(ProtocolError::InvalidMessage {
                    string: s.to_owned(),
                    cause: MessageParseError::InvalidPrefix(prefix.to_owned()),
                });
            }
        }

        Ok(Message {
            prefix: parsed.prefix.map(str::to_owned),
            command: parsed.command.to_owned(),
            params: parsed.params.iter().map(|p| (*p).to_owned()).collect(),
        })
    }
}
