use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type Source = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    /// The detection feed is missing or malformed. Fatal for the run; the
    /// ledger is never mutated on this path.
    #[error("detection feed unreadable at {path}: {source}")]
    FeedUnreadable { path: PathBuf, source: Source },

    /// The processed ledger exists but cannot be parsed. Never treated as an
    /// empty ledger: that would re-announce the entire feed.
    #[error("processed ledger corrupt at {path}: {source}")]
    LedgerCorrupt { path: PathBuf, source: Source },

    /// A voting store exists but cannot be parsed.
    #[error("store unreadable at {path}: {source}")]
    StoreUnreadable { path: PathBuf, source: Source },

    /// A persisted store could not be written (disk full, permissions).
    #[error("store write failed at {path}: {source}")]
    StoreWriteFailed { path: PathBuf, source: Source },
}
