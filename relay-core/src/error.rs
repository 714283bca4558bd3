use thiserror::Error;

/// Unified error taxonomy for the relay engine (spec §7).
///
/// The match engine (`engine`) never propagates `Storage`/`Codec`/`Invariant`
/// errors encountered on the hot path: it logs them and treats the record as
/// unmatched. The request manager and HTTP boundary propagate everything.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("storage: {0}")]
    Storage(String),

    #[error("codec: {0}")]
    Codec(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Coarse classification used by the HTTP boundary to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Storage,
    Codec,
    Invariant,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound => ErrorKind::NotFound,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Codec(_) => ErrorKind::Codec,
            Error::Invariant(_) => ErrorKind::Invariant,
        }
    }

    /// The HTTP boundary's status-code mapping for this error kind (spec §7).
    pub fn status_kind(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Storage | ErrorKind::Codec | ErrorKind::Invariant => 500,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
