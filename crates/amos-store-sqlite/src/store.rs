//! [`SqliteStore`]: the SQLite implementation of [`RevisionStore`] and
//! [`StageStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use amos_core::{
  revision::{Commit, HistoryQuery, NewCommit, NewRevision, Revision, SnapshotQuery},
  store::{RevisionStore, StageStore},
};

use crate::{
  Error, Result,
  encode::{COMMIT_COLUMNS, REVISION_COLUMNS, RawCommit, encode_source, revision_from_row},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An AMOS revision store backed by a single SQLite file.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an empty in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of revision rows in the log.
  pub async fn revision_count(&self) -> Result<i64> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM revisions", [], |r| r.get(0))?))
      .await?;
    Ok(n)
  }

  async fn distinct(&self, column: &'static str) -> Result<Vec<String>> {
    let values = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT DISTINCT {column} FROM revisions ORDER BY {column}"))?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(values)
  }
}

// ─── RevisionStore impl ──────────────────────────────────────────────────────

impl RevisionStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn commit(&self, commit: NewCommit, revisions: Vec<NewRevision>) -> Result<Commit> {
    if revisions.is_empty() {
      return Err(Error::EmptyCommit);
    }

    let source      = encode_source(commit.meta.source);
    let message     = commit.meta.message.clone();
    let user_id     = commit.meta.user_id;
    let user_info   = commit.meta.user_info.clone();
    let commit_hash = commit.meta.commit_hash.clone();
    let time        = commit.time_committed;
    let count       = revisions.len();

    // The transaction rolls back on drop if any insert fails.
    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO commits (source, message, user_id, user_info, commit_hash, time_committed)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![source, message, user_id, user_info, commit_hash, time],
        )?;
        let commit_id = tx.last_insert_rowid();
        {
          let mut stmt = tx.prepare(
            "INSERT INTO revisions (commit_id, component, lang, strname, text, since, timemodified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          for r in &revisions {
            stmt.execute(rusqlite::params![
              commit_id,
              r.component,
              r.lang,
              r.strname,
              r.text,
              r.since,
              r.timemodified,
            ])?;
          }
        }
        tx.commit()?;
        Ok(commit_id)
      })
      .await?;

    tracing::debug!(commit = id, revisions = count, "appended commit");
    Ok(Commit { id, time_committed: time, meta: commit.meta })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn snapshot(&self, query: SnapshotQuery) -> Result<Vec<Revision>> {
    let SnapshotQuery {
      component,
      lang,
      max_since,
      as_of,
      include_tombstones,
      include_history_of_deleted,
      strnames,
    } = query;

    let mut rows: Vec<Revision> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, commit_id, component, lang, strname, text, since, timemodified,
                  CASE WHEN ?6 AND text IS NULL THEN (
                    SELECT p.text FROM revisions p
                     WHERE p.component = ?1 AND p.lang = ?2 AND p.strname = w.strname
                       AND p.since <= ?3 AND p.timemodified <= ?4
                       AND p.text IS NOT NULL
                     ORDER BY p.timemodified DESC, p.id DESC
                     LIMIT 1
                  ) END AS last_text
             FROM (
               SELECT r.*,
                      ROW_NUMBER() OVER (
                        PARTITION BY r.strname ORDER BY r.timemodified DESC, r.id DESC
                      ) AS pos,
                      MIN(r.id) OVER (PARTITION BY r.strname) AS first_id
                 FROM revisions r
                WHERE r.component = ?1 AND r.lang = ?2
                  AND r.since <= ?3 AND r.timemodified <= ?4
             ) w
            WHERE w.pos = 1 AND (?5 OR w.text IS NOT NULL)
            ORDER BY w.first_id",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              component,
              lang,
              max_since,
              as_of,
              include_tombstones,
              include_history_of_deleted,
            ],
            revision_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Filtering after ranking is equivalent: ranks are per string name.
    if !strnames.is_empty() {
      rows.retain(|r| strnames.contains(&r.strname));
    }
    Ok(rows)
  }

  async fn history(&self, query: HistoryQuery) -> Result<Vec<Revision>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REVISION_COLUMNS}, NULL
             FROM revisions
            WHERE component = ?1 AND strname = ?2 AND (?3 IS NULL OR lang = ?3)
            ORDER BY timemodified, id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![query.component, query.strname, query.lang],
            revision_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn get_commit(&self, id: i64) -> Result<Option<Commit>> {
    let raw: Option<RawCommit> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"),
              rusqlite::params![id],
              RawCommit::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCommit::into_commit).transpose()
  }

  async fn list_components(&self) -> Result<Vec<String>> { self.distinct("component").await }

  async fn list_languages(&self) -> Result<Vec<String>> { self.distinct("lang").await }
}

// ─── StageStore impl ─────────────────────────────────────────────────────────

impl StageStore for SqliteStore {
  type Error = Error;

  async fn load_stage(&self, user_id: i64, token: String) -> Result<Option<String>> {
    let payload = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT payload FROM stages WHERE user_id = ?1 AND token = ?2",
              rusqlite::params![user_id, token],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(payload)
  }

  async fn save_stage(&self, user_id: i64, token: String, payload: String) -> Result<()> {
    let now = amos_core::now();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO stages (user_id, token, payload, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (user_id, token)
           DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
          rusqlite::params![user_id, token, payload, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_stage(&self, user_id: i64, token: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM stages WHERE user_id = ?1 AND token = ?2",
          rusqlite::params![user_id, token],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
