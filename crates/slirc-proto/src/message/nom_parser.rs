//! Nom-based IRC line parser.
//!
//! This module provides zero-copy parsing of a single IRC line using the nom
//! parser combinator library. Framing (finding line boundaries) happens in
//! [`crate::framer`]; by the time a line gets here its terminator is gone.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::opt,
    error::ErrorKind,
    sequence::preceded,
    IResult,
};
use smallvec::SmallVec;

/// Parse message prefix (the part after `:` and before the first space).
fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// Parse the command name (1*letter or 3digit).
fn parse_command(input: &str) -> IResult<&str, &str> {
    let (rest, cmd) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;

    // RFC 2812: command = 1*letter / 3digit
    let is_all_letters = cmd.chars().all(|c| c.is_ascii_alphabetic());
    let is_three_digits = cmd.len() == 3 && cmd.chars().all(|c| c.is_ascii_digit());

    if is_all_letters || is_three_digits {
        Ok((rest, cmd))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::AlphaNumeric,
        )))
    }
}

/// Parse IRC message parameters from the remaining input after the command.
///
/// Handles both regular space-separated parameters and the trailing parameter
/// (prefixed with `:`) which may contain spaces. Multiple consecutive spaces
/// are treated as a single separator.
fn parse_params(input: &str) -> (&str, SmallVec<[&str; 15]>) {
    let mut params: SmallVec<[&str; 15]> = SmallVec::new();
    let mut rest = input;

    while let Some(b' ') = rest.as_bytes().first().copied() {
        while rest.as_bytes().first() == Some(&b' ') {
            rest = &rest[1..];
        }

        if rest.is_empty() || rest.starts_with('\r') || rest.starts_with('\n') {
            break;
        }

        if let Some(after_colon) = rest.strip_prefix(':') {
            // Trailing parameter - everything after `:` until line end
            let end = after_colon.find(['\r', '\n']).unwrap_or(after_colon.len());
            params.push(&after_colon[..end]);
            rest = &after_colon[end..];
            break;
        }

        let end = rest.find([' ', '\r', '\n']).unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    (rest, params)
}

/// Parse a complete IRC line into its components.
///
/// ```text
/// [:prefix] <command> [params...] [:trailing]
/// ```
pub(crate) fn parse_message(input: &str) -> IResult<&str, ParsedMessage<'_>> {
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;

    let (input, command) = parse_command(input)?;

    let (rest, params) = parse_params(input);

    // Anything glued to the command (e.g. `PING#x`) is not a separator.
    let leftover = rest.trim_end_matches(['\r', '\n']);
    if !leftover.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            leftover,
            ErrorKind::Space,
        )));
    }

    Ok((
        rest,
        ParsedMessage {
            prefix,
            command,
            params,
        },
    ))
}

/// A parsed IRC line with borrowed string slices.
///
/// This is the intermediate representation produced by the nom parser.
/// It holds references into the original input string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedMessage<'a> {
    /// Raw prefix string (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// The command name.
    pub command: &'a str,
    /// Command parameters, including trailing.
    pub params: SmallVec<[&'a str; 15]>,
}

impl<'a> ParsedMessage<'a> {
    /// Parse an IRC line into a `ParsedMessage`.
    pub fn parse(input: &'a str) -> Result<Self, DetailedParseError> {
        match parse_message(input) {
            Ok((_remaining, msg)) => Ok(msg),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(DetailedParseError {
                position: input.len() - e.input.len(),
                kind: e.code,
            }),
            Err(nom::Err::Incomplete(_)) => Err(DetailedParseError {
                position: input.len(),
                kind: ErrorKind::Eof,
            }),
        }
    }
}

/// Parse error with position information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DetailedParseError {
    /// Character position where parsing failed.
    pub position: usize,
    /// The nom error kind.
    pub kind: ErrorKind,
}
