use thiserror::Error;
use ulid::Ulid;

use crate::model::RankedKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid schedule rule: {0}")]
    InvalidRule(String),
    #[error("not found: {0}")]
    NotFound(Ulid),
    /// Another writer committed to the same collection after our snapshot was taken.
    #[error("concurrent modification of {0} ranks")]
    TransactionConflict(RankedKind),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("invalid name: {0}")]
    InvalidName(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl Error {
    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        Error::InvalidRule(msg.into())
    }

    /// Only conflicts are worth restarting a unit of work for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionConflict(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
