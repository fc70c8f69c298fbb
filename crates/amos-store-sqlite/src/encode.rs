//! Conversions between SQLite rows and `amos-core` records.
//!
//! Timestamps and version codes are stored as integers; the commit source is
//! stored as its lowercase name.

use std::str::FromStr as _;

use amos_core::revision::{Commit, CommitMeta, CommitSource, Revision};

use crate::{Error, Result};

// ─── CommitSource ────────────────────────────────────────────────────────────

pub fn encode_source(source: CommitSource) -> String { source.to_string() }

pub fn decode_source(s: &str) -> Result<CommitSource> {
  CommitSource::from_str(s).map_err(|_| Error::UnknownSource(s.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for a commit, in this order.
pub const COMMIT_COLUMNS: &str =
  "id, source, message, user_id, user_info, commit_hash, time_committed";

/// A `commits` row before its source is decoded.
pub struct RawCommit {
  pub id:             i64,
  pub source:         String,
  pub message:        String,
  pub user_id:        Option<i64>,
  pub user_info:      String,
  pub commit_hash:    Option<String>,
  pub time_committed: i64,
}

impl RawCommit {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      source:         row.get(1)?,
      message:        row.get(2)?,
      user_id:        row.get(3)?,
      user_info:      row.get(4)?,
      commit_hash:    row.get(5)?,
      time_committed: row.get(6)?,
    })
  }

  pub fn into_commit(self) -> Result<Commit> {
    Ok(Commit {
      id:             self.id,
      time_committed: self.time_committed,
      meta:           CommitMeta {
        message:     self.message,
        source:      decode_source(&self.source)?,
        user_info:   self.user_info,
        user_id:     self.user_id,
        commit_hash: self.commit_hash,
      },
    })
  }
}

/// Columns selected for a revision, in this order. `last_text` is not a
/// stored column; queries that do not compute it select `NULL`.
pub const REVISION_COLUMNS: &str =
  "id, commit_id, component, lang, strname, text, since, timemodified";

pub fn revision_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Revision> {
  Ok(Revision {
    id:           row.get(0)?,
    commit_id:    row.get(1)?,
    component:    row.get(2)?,
    lang:         row.get(3)?,
    strname:      row.get(4)?,
    text:         row.get(5)?,
    since:        row.get(6)?,
    timemodified: row.get(7)?,
    last_text:    row.get(8)?,
  })
}
