//! Error type for `amos-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A `commits.source` value no [`amos_core::revision::CommitSource`]
  /// variant is stored as.
  #[error("unknown commit source: {0:?}")]
  UnknownSource(String),

  #[error("commit contains no revisions")]
  EmptyCommit,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
