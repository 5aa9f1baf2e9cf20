//! Front-end command types

use std::borrow::Cow;

/// Maximum key length accepted by the front end (matches the client limit)
pub const MAX_KEY_LENGTH: usize = crate::memcache::MAX_KEY_SIZE;

/// Parsed front-end command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// get <key>
    Get { key: Cow<'a, [u8]> },

    /// set <key> <flags> <exptime> <bytes> [noreply]
    Set {
        key: Cow<'a, [u8]>,
        flags: u32,
        exptime: u64,
        data: Cow<'a, [u8]>,
        noreply: bool,
    },

    /// delete <key> [noreply]
    Delete { key: Cow<'a, [u8]>, noreply: bool },

    /// version
    Version,

    /// quit
    Quit,
}

impl Command<'_> {
    /// Returns true if this command should not send a response
    pub fn is_noreply(&self) -> bool {
        match self {
            Command::Set { noreply, .. } | Command::Delete { noreply, .. } => *noreply,
            _ => false,
        }
    }

    /// Command name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Set { .. } => "set",
            Command::Delete { .. } => "delete",
            Command::Version => "version",
            Command::Quit => "quit",
        }
    }

    /// The key the command addresses, if any
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            Command::Get { key } | Command::Set { key, .. } | Command::Delete { key, .. } => {
                Some(key.as_ref())
            }
            Command::Version | Command::Quit => None,
        }
    }
}

/// Check if a key is valid
pub fn is_valid_key(key: &[u8]) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    // Keys cannot contain control characters or whitespace
    key.iter().all(|&b| b > 32 && b < 127)
}
