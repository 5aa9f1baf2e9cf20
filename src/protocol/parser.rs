//! Hand-written parser for the front-end ASCII protocol
//!
//! Two-phase parsing:
//! 1. Parse command line (up to \r\n)
//! 2. For `set`, wait until the data block is buffered

use crate::ProtocolError;
use crate::memcache::MAX_VALUE_SIZE;
use crate::protocol::command::{Command, MAX_KEY_LENGTH, is_valid_key};
use std::borrow::Cow;

/// Case-insensitive command comparison (avoids allocation from to_ascii_lowercase)
#[inline]
fn cmd_eq(cmd: &[u8], expected: &[u8]) -> bool {
    cmd.len() == expected.len()
        && cmd
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

/// Result of parsing
#[derive(Debug)]
pub enum ParseResult<'a> {
    /// Command fully parsed
    Complete(Command<'a>, usize),
    /// Need more data to complete parsing
    NeedMoreData,
    /// Parse error
    Error(ProtocolError),
}

/// Parse a command from a buffer
pub fn parse(buf: &[u8]) -> ParseResult<'_> {
    // Find the end of the command line
    let line_end = match find_crlf(buf) {
        Some(pos) => pos,
        None => return ParseResult::NeedMoreData,
    };

    let line = &buf[..line_end];

    // Parse the command name
    let mut parts = line.split(|&b| b == b' ');
    let cmd_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return ParseResult::Error(ProtocolError::InvalidCommand("empty command".to_string())),
    };

    // Match command (case-insensitive, no allocation)
    if cmd_eq(cmd_name, b"get") {
        parse_get(parts, line_end + 2)
    } else if cmd_eq(cmd_name, b"set") {
        parse_set(parts, buf, line_end)
    } else if cmd_eq(cmd_name, b"delete") {
        parse_delete(parts, line_end + 2)
    } else if cmd_eq(cmd_name, b"version") {
        ParseResult::Complete(Command::Version, line_end + 2)
    } else if cmd_eq(cmd_name, b"quit") {
        ParseResult::Complete(Command::Quit, line_end + 2)
    } else {
        ParseResult::Error(ProtocolError::InvalidCommand(
            String::from_utf8_lossy(cmd_name).to_string(),
        ))
    }
}

/// Find \r\n in buffer
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memmem::find(buf, b"\r\n")
}

fn check_key(key: &[u8]) -> Result<(), ProtocolError> {
    if is_valid_key(key) {
        return Ok(());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }
    Err(ProtocolError::InvalidKey(
        String::from_utf8_lossy(key).to_string(),
    ))
}

/// Parse get command; exactly one key
fn parse_get<'a>(parts: impl Iterator<Item = &'a [u8]>, consumed: usize) -> ParseResult<'a> {
    let mut keys = parts.filter(|part| !part.is_empty());

    let key = match keys.next() {
        Some(key) => key,
        None => {
            return ParseResult::Error(ProtocolError::InvalidCommand(
                "get requires a key".to_string(),
            ));
        }
    };

    if let Err(e) = check_key(key) {
        return ParseResult::Error(e);
    }

    if keys.next().is_some() {
        return ParseResult::Error(ProtocolError::InvalidCommand(
            "get accepts a single key".to_string(),
        ));
    }

    ParseResult::Complete(
        Command::Get {
            key: Cow::Borrowed(key),
        },
        consumed,
    )
}

/// Parse set command
fn parse_set<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
    buf: &'a [u8],
    line_end: usize,
) -> ParseResult<'a> {
    // <key> <flags> <exptime> <bytes> [noreply]
    let key = match parts.next() {
        Some(k) if !k.is_empty() => k,
        _ => return ParseResult::Error(ProtocolError::InvalidCommand("missing key".to_string())),
    };

    if let Err(e) = check_key(key) {
        return ParseResult::Error(e);
    }

    let flags = match parts.next().and_then(parse_number) {
        Some(f) => f,
        None => return ParseResult::Error(ProtocolError::InvalidFlags),
    };

    let exptime = match parts.next().and_then(parse_number) {
        Some(e) => e,
        None => return ParseResult::Error(ProtocolError::InvalidExptime),
    };

    let bytes: usize = match parts.next().and_then(parse_number) {
        Some(b) => b,
        None => return ParseResult::Error(ProtocolError::InvalidBytesLength),
    };

    if bytes > MAX_VALUE_SIZE {
        return ParseResult::Error(ProtocolError::ValueTooLarge);
    }

    let noreply = parts.next().is_some_and(|s| s == b"noreply");

    // Check if we have enough data for the data block
    let data_start = line_end + 2;
    let data_end = data_start + bytes;
    let total_needed = data_end + 2;

    if buf.len() < total_needed {
        return ParseResult::NeedMoreData;
    }

    // Verify trailing \r\n
    if buf[data_end] != b'\r' || buf[data_end + 1] != b'\n' {
        return ParseResult::Error(ProtocolError::UnexpectedData);
    }

    let cmd = Command::Set {
        key: Cow::Borrowed(key),
        flags,
        exptime,
        data: Cow::Borrowed(&buf[data_start..data_end]),
        noreply,
    };

    ParseResult::Complete(cmd, total_needed)
}

/// Parse delete command
/// Format: delete <key> [exptime] [noreply]\r\n
/// exptime is accepted but ignored (legacy clients still send it)
fn parse_delete<'a>(mut parts: impl Iterator<Item = &'a [u8]>, consumed: usize) -> ParseResult<'a> {
    let key = match parts.next() {
        Some(k) if !k.is_empty() => k,
        _ => {
            return ParseResult::Error(ProtocolError::InvalidCommand(
                "delete requires a key".to_string(),
            ));
        }
    };

    if let Err(e) = check_key(key) {
        return ParseResult::Error(e);
    }

    let noreply = parts.any(|part| part == b"noreply");

    ParseResult::Complete(
        Command::Delete {
            key: Cow::Borrowed(key),
            noreply,
        },
        consumed,
    )
}

/// Parse ASCII digits as an unsigned number
fn parse_number<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
