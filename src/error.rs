//! Crate-wide error taxonomy.
//!
//! Internal code composes [`anyhow::Error`] for context chaining, the same
//! way the rest of this codebase always has. At module boundaries (store,
//! library, scheduler, HTTP handlers) errors are classified into an
//! [`ErrorKind`] so callers -- and ultimately HTTP clients -- can act on
//! them without string-matching a message.

use std::fmt;

/// The error kinds a caller can usefully branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing origin/snapshot/artifact/blob.
    NotFound,
    /// A second writer tried to open an already-open snapshot.
    Conflict,
    /// Malformed URL, bad digest, bad manifest JSON, unknown strategy/library.
    InvalidArgument,
    /// Blob digest mismatch discovered on read.
    IntegrityError,
    /// The operation's context was cancelled.
    Cancelled,
    /// A job or operation deadline passed.
    DeadlineExceeded,
    /// Capability token missing, invalid, or out of scope.
    Unauthorized,
    /// Transport or filesystem failure.
    IOError,
    /// Catchall for anything else.
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::IntegrityError => "integrity_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::IOError => "io_error",
            ErrorKind::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

/// A classified error carrying a human-readable message and, where
/// available, the underlying cause.
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: anyhow::Error) -> Self {
        Self { kind, message: message.into(), source: Some(source) }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(ErrorKind::DeadlineExceeded, "deadline exceeded")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => ErrorKind::Conflict,
            _ => ErrorKind::IOError,
        };
        Error::with_source(kind, "I/O error", err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::InvalidArgument, "malformed JSON", err.into())
    }
}
