//! Error kinds for the index engine.
//!
//! `NOT_FOUND` is deliberately not a variant here: `get`/`remove` on an
//! absent key is represented as `Ok(None)`, keeping errors that are
//! *raised* distinct from results that are merely *absent*. `REGION_FULL`
//! is likewise not a variant: it is the
//! `Ok(false)` return of the bucket's `add_*` methods, consumed entirely
//! within the tree engine to trigger a split and never surfaced.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum IndexError {
    /// Serialized key+value exceeds `MAX_ENTRY_SIZE`, or exceeds the
    /// region size even as the bucket's only entry.
    EntryTooLarge { size: usize, limit: usize },
    /// A descending range scan was requested.
    Unsupported(&'static str),
    /// Propagated from the page cache or WAL collaborators.
    Io(io::Error),
    /// Malformed flags, a `remove` on a non-leaf bucket, an unexpected
    /// sentinel: state that should be unreachable outside corruption or a
    /// logic bug.
    StateViolation(String),
}

impl From<io::Error> for IndexError {
    fn from(e: io::Error) -> Self {
        IndexError::Io(e)
    }
}

impl From<page_store::BpmError> for IndexError {
    fn from(e: page_store::BpmError) -> Self {
        match e {
            page_store::BpmError::Io(io_err) => IndexError::Io(io_err),
            other => IndexError::StateViolation(other.to_string()),
        }
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::EntryTooLarge { size, limit } => {
                write!(f, "entry of {} bytes exceeds limit of {} bytes", size, limit)
            }
            IndexError::Unsupported(what) => write!(f, "unsupported operation: {}", what),
            IndexError::Io(e) => write!(f, "I/O error: {}", e),
            IndexError::StateViolation(msg) => write!(f, "state violation: {}", msg),
        }
    }
}

impl std::error::Error for IndexError {}

pub type IndexResult<T> = Result<T, IndexError>;
