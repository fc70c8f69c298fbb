//! The `RevisionStore` and `StageStore` traits.
//!
//! Implemented by storage backends ([`crate::memory::MemoryStore`],
//! `amos-store-sqlite`). Components, stages and policies receive a store
//! handle explicitly; there is no process-wide repository.

use std::future::Future;

use crate::revision::{Commit, HistoryQuery, NewCommit, NewRevision, Revision, SnapshotQuery};

// ─── Revision store ──────────────────────────────────────────────────────────

/// Abstraction over the durable revision log.
///
/// The log is append-only: a commit adds one `Commit` row and its revision
/// rows, nothing is ever updated. All methods return `Send` futures so the
/// trait can be used in multi-threaded async runtimes.
pub trait RevisionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a commit and all of its revisions atomically.
  ///
  /// Either every row becomes visible or none does. A revision set that
  /// repeats `(component, lang, since, strname)` is rejected as a whole.
  fn commit(
    &self,
    commit: NewCommit,
    revisions: Vec<NewRevision>,
  ) -> impl Future<Output = Result<Commit, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The winning revision of every string of a component in one language.
  ///
  /// Among revisions with `since <= max_since` and `timemodified <= as_of`,
  /// the one with the greatest `(timemodified, id)` wins per string name.
  /// Tombstones are returned only when `include_tombstones` is set.
  fn snapshot(
    &self,
    query: SnapshotQuery,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + '_;

  /// Every revision of one string, ordered by `(timemodified, id)`.
  fn history(
    &self,
    query: HistoryQuery,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + '_;

  /// Retrieve a commit by id. Returns `None` if not found.
  fn get_commit(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Commit>, Self::Error>> + Send + '_;

  /// Names of all components with at least one revision, sorted.
  fn list_components(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Codes of all languages with at least one revision, sorted.
  fn list_languages(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}

// ─── Stage store ─────────────────────────────────────────────────────────────

/// Side channel holding serialized persistent stages, keyed by user and
/// session token.
pub trait StageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn load_stage(
    &self,
    user_id: i64,
    token: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Replace the stored payload for `(user_id, token)`.
  fn save_stage(
    &self,
    user_id: i64,
    token: String,
    payload: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_stage(
    &self,
    user_id: i64,
    token: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
