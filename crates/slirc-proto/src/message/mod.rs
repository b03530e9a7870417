//! IRC message types and parsing.

mod nom_parser;
mod parse;
mod serialize;
mod types;

pub use self::types::Message;
