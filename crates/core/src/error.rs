//! Error types for ezpoll-core.
//!
//! Every error rejects the whole transaction; no variant implies a partial
//! state change.

use thiserror::Error;

use crate::Hash;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The election or a participant record does not exist yet.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempt to create a record that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Caller may not perform this action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The election is not in the status the action requires.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The participant already cast a ballot.
    #[error("already done: {0}")]
    AlreadyDone(String),

    /// Wrong argument count or an argument that does not decode.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Opt-out, clear, update and delete paths are always refused.
    #[error("forbidden exit path: {0}")]
    ForbiddenExit(String),

    /// Transaction signature does not match its sender.
    #[error("invalid signature for sender {0}")]
    InvalidSignature(String),

    /// Transaction was already committed.
    #[error("transaction {0} already committed")]
    Replayed(Hash),

    /// Ledger time may not move backwards.
    #[error("ledger time {requested} is before current time {current}")]
    ClockSkew { current: u64, requested: u64 },

    /// Persisted state does not satisfy the schema or its invariants.
    #[error("corrupted state: {0}")]
    Corrupted(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deployment config could not be read or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
}

/// The rejection taxonomy, without context strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Unauthorized,
    InvalidState,
    AlreadyDone,
    MalformedInput,
    ForbiddenExit,
    InvalidSignature,
    Replayed,
    ClockSkew,
    Corrupted,
    Serialization,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::AlreadyDone(_) => ErrorKind::AlreadyDone,
            Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::ForbiddenExit(_) => ErrorKind::ForbiddenExit,
            Error::InvalidSignature(_) => ErrorKind::InvalidSignature,
            Error::Replayed(_) => ErrorKind::Replayed,
            Error::ClockSkew { .. } => ErrorKind::ClockSkew,
            Error::Corrupted(_) => ErrorKind::Corrupted,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
