//! Request encoding and response decoding for the memcached ASCII subset
//! spoken by the client (`set`, `get`, `delete`).
//!
//! Everything here is pure: the connection owns the I/O and feeds complete
//! lines or exact byte counts into these functions.

use crate::error::ClientError;
use bytes::{BufMut, Bytes, BytesMut};
use itoa::Buffer;

/// Maximum key size accepted by the client
pub const MAX_KEY_SIZE: usize = 255;

/// Maximum value size accepted by the client (1 MiB)
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Longest response line the client will buffer; a `VALUE` header with a
/// maximum-size key and every numeric field at `u64::MAX` still fits
pub const MAX_LINE_SIZE: usize = MAX_KEY_SIZE + 128;

/// Per-direction buffer capacity of a connection
pub const BUFFER_SIZE: usize = MAX_KEY_SIZE + MAX_VALUE_SIZE + 1024;

pub const CRLF: &[u8] = b"\r\n";
pub const STORED: &[u8] = b"STORED\r\n";
pub const END: &[u8] = b"END\r\n";
pub const DELETED: &[u8] = b"DELETED\r\n";
pub const NOT_FOUND: &[u8] = b"NOT_FOUND\r\n";

/// Framing that follows a value in a `get` response
pub const VALUE_TRAILER: &[u8] = b"\r\nEND\r\n";

/// Reject keys that would break request framing
pub fn validate_key(key: &str) -> Result<(), ClientError> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_KEY_SIZE || !bytes.iter().all(|&b| b > 32 && b < 127)
    {
        return Err(ClientError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Reject values larger than the connection buffers
pub fn validate_value(value: &[u8]) -> Result<(), ClientError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(ClientError::ValueTooLarge(value.len()));
    }
    Ok(())
}

/// `set <key> 0 0 <len>\r\n<value>\r\n`
pub fn encode_set(key: &str, value: &[u8]) -> BytesMut {
    let mut itoa_buf = Buffer::new();
    let len = itoa_buf.format(value.len());
    let mut buf = BytesMut::with_capacity(key.len() + len.len() + value.len() + 16);
    buf.put_slice(b"set ");
    buf.put_slice(key.as_bytes());
    // flags and exptime are always zero
    buf.put_slice(b" 0 0 ");
    buf.put_slice(len.as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(value);
    buf.put_slice(CRLF);
    buf
}

/// `get <key>\r\n`
pub fn encode_get(key: &str) -> BytesMut {
    simple_command(b"get ", key)
}

/// `delete <key>\r\n`
pub fn encode_delete(key: &str) -> BytesMut {
    simple_command(b"delete ", key)
}

fn simple_command(prefix: &[u8], key: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(prefix.len() + key.len() + CRLF.len());
    buf.put_slice(prefix);
    buf.put_slice(key.as_bytes());
    buf.put_slice(CRLF);
    buf
}

/// Decode the single response line of a `set`
pub fn decode_set(line: &[u8]) -> Result<(), ClientError> {
    if line == STORED {
        Ok(())
    } else {
        Err(ClientError::NotStored)
    }
}

/// Decode the single response line of a `delete`
pub fn decode_delete(line: &[u8]) -> Result<(), ClientError> {
    match line {
        DELETED => Ok(()),
        NOT_FOUND => Err(ClientError::NotFound),
        _ => Err(ClientError::UnknownResponse),
    }
}

/// Parse the first line of a `get` response and return the value length.
///
/// Grammar: `VALUE <key> <flags> <length>[ <cas>]\r\n`. A bare `END\r\n` is a
/// miss.
pub fn parse_get_header(line: &[u8]) -> Result<usize, ClientError> {
    if line == END {
        return Err(ClientError::NotFound);
    }

    let body = line
        .strip_suffix(CRLF)
        .ok_or(ClientError::InvalidHeader)?;
    let mut parts = body.split(|&b| b == b' ');

    if parts.next() != Some(b"VALUE".as_slice()) {
        return Err(ClientError::InvalidHeader);
    }

    match parts.next() {
        Some(key) if is_header_key(key) => {}
        _ => return Err(ClientError::InvalidHeader),
    }

    parts
        .next()
        .and_then(parse_digits)
        .ok_or(ClientError::InvalidHeader)?;

    let length = parts
        .next()
        .and_then(parse_digits)
        .filter(|&length| length <= MAX_VALUE_SIZE)
        .ok_or(ClientError::InvalidHeader)?;

    // optional cas unique
    if let Some(cas) = parts.next() {
        parse_digits(cas).ok_or(ClientError::InvalidHeader)?;
    }

    if parts.next().is_some() {
        return Err(ClientError::InvalidHeader);
    }

    Ok(length)
}

/// Split the `length + VALUE_TRAILER.len()` bytes read after a header into
/// the value, verifying the trailing framing.
pub fn decode_get_trailer(mut frame: BytesMut, length: usize) -> Result<Bytes, ClientError> {
    if frame.len() != length + VALUE_TRAILER.len() || &frame[length..] != VALUE_TRAILER {
        return Err(ClientError::UnexpectedTrailer);
    }
    frame.truncate(length);
    Ok(frame.freeze())
}

fn is_header_key(key: &[u8]) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_SIZE && key.iter().all(|&b| b > 32 && b < 127)
}

/// Parse a non-empty run of ASCII digits (no sign, no whitespace)
fn parse_digits(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
