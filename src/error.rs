use crate::shared::ObjectHash;

/// Errors raised while reading or writing the object store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The hash is neither a loose object nor present in any pack.
    #[error("object not found: {0}")]
    NotFound(ObjectHash),

    #[error("no such branch: {0}")]
    NoSuchBranch(String),

    /// A path segment does not exist in the tree being searched.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Bad magic, bad version, bad opcode, truncated data or an unparsable payload.
    #[error("malformed data: {0}")]
    MalformedFormat(String),

    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch {
        expected: ObjectHash,
        actual: ObjectHash,
    },

    /// A tree operation tried to descend through a non-directory entry.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedFormat(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
