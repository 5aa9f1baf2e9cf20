//! Front-end ASCII protocol (the memcached subset kvgate serves)

pub mod command;
pub mod parser;
pub mod response;

pub use command::{Command, MAX_KEY_LENGTH};
pub use parser::{ParseResult, parse};
pub(crate) use parser::find_crlf;
pub use response::ResponseWriter;
