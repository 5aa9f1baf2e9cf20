//! Error types for kvgate

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Main error type for kvgate
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Front-end request parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid flags")]
    InvalidFlags,

    #[error("Invalid exptime")]
    InvalidExptime,

    #[error("Invalid bytes length")]
    InvalidBytesLength,

    #[error("Key too long (max 255 bytes)")]
    KeyTooLong,

    #[error("Value too large")]
    ValueTooLarge,

    #[error("Unexpected data")]
    UnexpectedData,
}

/// Errors produced by the memcached wire client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("not found")]
    NotFound,

    #[error("not stored")]
    NotStored,

    #[error("invalid value header")]
    InvalidHeader,

    #[error("unexpected bytes after value")]
    UnexpectedTrailer,

    #[error("unknown response")]
    UnknownResponse,

    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("value of {0} bytes exceeds the 1 MiB limit")]
    ValueTooLarge(usize),

    #[error("failed to {op} key {key:?}: {source}")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection is closed")]
    Closed,

    #[error("connection is desynchronized")]
    Desynchronized,

    #[error("pool is closed")]
    PoolClosed,

    #[error("pool size must be at least 1")]
    InvalidPoolSize,

    #[error("{}", join_errors(.0))]
    Multiple(Vec<ClientError>),
}

impl ClientError {
    /// Combine a primary error with follow-up errors (e.g. close failures
    /// during a construction rollback). A lone primary error is returned as-is.
    pub fn combine(primary: ClientError, rest: Vec<ClientError>) -> ClientError {
        if rest.is_empty() {
            return primary;
        }
        let mut all = Vec::with_capacity(rest.len() + 1);
        all.push(primary);
        all.extend(rest);
        ClientError::Multiple(all)
    }

    /// Build an aggregate from a list of errors; `None` when the list is empty
    pub fn aggregate(mut errors: Vec<ClientError>) -> Option<ClientError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ClientError::Multiple(errors)),
        }
    }

    /// True for failures of the underlying transport (as opposed to
    /// well-formed responses that encode an error condition)
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Io { .. } | ClientError::Dial { .. })
    }

    fn marker(&self) -> Option<ErrorKind> {
        match self {
            ClientError::NotFound => Some(ErrorKind::NotFound),
            ClientError::UnknownResponse => Some(ErrorKind::Unknown),
            ClientError::Multiple(errors) => errors.iter().find_map(ClientError::marker),
            _ => None,
        }
    }
}

/// Storage capability errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("key not found")]
    NotFound,

    #[error("storage is not ready")]
    NotReady,

    #[error("failed to {op} key: {source}")]
    Client {
        op: &'static str,
        #[source]
        source: ClientError,
    },
}

impl StorageError {
    pub(crate) fn client(op: &'static str) -> impl FnOnce(ClientError) -> StorageError {
        move |source| StorageError::Client { op, source }
    }

    fn marker(&self) -> Option<ErrorKind> {
        match self {
            StorageError::NotFound => Some(ErrorKind::NotFound),
            _ => None,
        }
    }
}

/// One component's terminal error inside a lifecycle run
#[derive(Debug)]
pub struct ComponentFailure {
    pub name: String,
    pub index: usize,
    pub error: anyhow::Error,
}

impl fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{}): {:#}", self.name, self.index, self.error)
    }
}

/// Aggregate result of a lifecycle run that had failing components
#[derive(Error, Debug)]
#[error("{} component(s) finished with errors: {}", .failures.len(), join_errors(.failures))]
pub struct LifecycleError {
    pub failures: Vec<ComponentFailure>,
}

/// Outward classification of an error at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unknown,
    Internal,
}

/// Classify an error by walking its source chain.
///
/// The first link that carries a `NotFound` or `Unknown` marker decides;
/// anything else is `Internal`.
pub fn classify(err: &(dyn StdError + 'static)) -> ErrorKind {
    let mut next = Some(err);
    while let Some(current) = next {
        let marker = if let Some(e) = current.downcast_ref::<ClientError>() {
            e.marker()
        } else if let Some(e) = current.downcast_ref::<StorageError>() {
            e.marker()
        } else {
            None
        };
        if let Some(kind) = marker {
            return kind;
        }
        next = current.source();
    }
    ErrorKind::Internal
}

fn join_errors<T: fmt::Display>(errors: &[T]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, GatewayError>;
