//! Error types for statetable

use std::fmt;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for table, singleton and cache operations
#[derive(Debug)]
pub enum Error {
    /// Lookup failed; carries the message supplied by the caller
    NotFound(String),

    /// An end cursor was passed where a live position is required
    InvalidCursor(&'static str),

    /// Capability outside the table model
    Unsupported(&'static str),

    /// Handle no longer refers to a live row
    InvalidHandle,

    /// A row with the same primary key already exists
    DuplicateKey(u64),

    /// An updater changed the primary key of a stored row
    PrimaryKeyChanged,

    /// Row serialization or deserialization failed
    Codec(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "{}", msg),
            Error::InvalidCursor(msg) => write!(f, "{}", msg),
            Error::Unsupported(msg) => write!(f, "{}", msg),
            Error::InvalidHandle => write!(f, "handle does not refer to a live row"),
            Error::DuplicateKey(key) => write!(f, "row with primary key {} already exists", key),
            Error::PrimaryKeyChanged => write!(f, "updater cannot change the primary key of a row"),
            Error::Codec(msg) => write!(f, "codec error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}
