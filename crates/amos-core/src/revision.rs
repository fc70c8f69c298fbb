//! Commit and revision records of the append-only log.
//!
//! Every change to a string is one [`Revision`] row linked to the [`Commit`]
//! that introduced it. Rows are never updated; a removal is recorded as a
//! row without text (a tombstone).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{StringValue, Timestamp};

// ─── Commit source ───────────────────────────────────────────────────────────

/// Where a commit came from. Persisted as its lowercase name.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommitSource {
  /// Automated maintenance job.
  Bot,
  /// Mirrored from an upstream git commit.
  Git,
  /// Bulk import of a language file.
  Import,
  /// Interactive edit by a translator.
  Amos,
  /// Replay of a scripted commit message instruction.
  CommitScript,
  /// A translation re-confirmed as up to date for a newer branch.
  UpToDate,
  /// Correction of drift between the repository and upstream.
  FixDrift,
  AutoMerge,
  Backport,
  Unittest,
}

// ─── Commits ─────────────────────────────────────────────────────────────────

/// Caller-supplied commit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
  pub message:     String,
  pub source:      CommitSource,
  /// Free-text author, e.g. `"Jane Doe <jane@example.com>"`.
  pub user_info:   String,
  pub user_id:     Option<i64>,
  /// Hash of the upstream git commit this one mirrors.
  pub commit_hash: Option<String>,
}

impl CommitMeta {
  pub fn new(message: impl Into<String>, source: CommitSource, user_info: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      source,
      user_info: user_info.into(),
      user_id: None,
      commit_hash: None,
    }
  }
}

/// Input to [`crate::store::RevisionStore::commit`].
#[derive(Debug, Clone)]
pub struct NewCommit {
  pub meta:           CommitMeta,
  pub time_committed: Timestamp,
}

/// A persisted commit. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
  pub id:             i64,
  pub time_committed: Timestamp,
  #[serde(flatten)]
  pub meta:           CommitMeta,
}

// ─── Revisions ───────────────────────────────────────────────────────────────

/// One row to be appended as part of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRevision {
  pub component:    String,
  pub lang:         String,
  pub strname:      String,
  /// `None` records a deletion.
  pub text:         Option<String>,
  /// Code of the first version this value applies to.
  pub since:        u32,
  pub timemodified: Timestamp,
}

/// A persisted revision row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
  /// Insertion sequence; breaks ties between equal `timemodified`.
  pub id:           i64,
  pub commit_id:    i64,
  pub component:    String,
  pub lang:         String,
  pub strname:      String,
  pub text:         Option<String>,
  pub since:        u32,
  pub timemodified: Timestamp,
  /// Most recent text before deletion; only filled on tombstones returned
  /// by snapshot queries asking for it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_text:    Option<String>,
}

impl Revision {
  pub fn deleted(&self) -> bool { self.text.is_none() }

  /// Ordering key of the "most recent wins" rule.
  pub fn recency(&self) -> (Timestamp, i64) { (self.timemodified, self.id) }

  pub fn into_string_value(self) -> StringValue {
    StringValue::from_stored(self.strname, self.text, self.timemodified, self.last_text)
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::RevisionStore::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotQuery {
  pub component:                  String,
  pub lang:                       String,
  /// Only revisions with `since <= max_since` are considered.
  pub max_since:                  u32,
  /// Only revisions with `timemodified <= as_of` are considered.
  pub as_of:                      Timestamp,
  pub include_tombstones:         bool,
  pub include_history_of_deleted: bool,
  /// Restrict to these string names; empty means all.
  pub strnames:                   Vec<String>,
}

/// Parameters for [`crate::store::RevisionStore::history`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
  pub component: String,
  pub strname:   String,
  /// Restrict to one language; `None` returns every language's timeline.
  pub lang:      Option<String>,
}

/// Pick the winning revision per string name, as every backend must.
///
/// Rows outside the query window are ignored. Result is ordered by the first
/// appearance of each string name.
pub fn select_snapshot(
  rows: impl IntoIterator<Item = Revision>,
  query: &SnapshotQuery,
) -> Vec<Revision> {
  use std::collections::HashMap;

  let mut order: Vec<String> = Vec::new();
  let mut winners: HashMap<String, Revision> = HashMap::new();
  let mut last_texts: HashMap<String, (Timestamp, i64, String)> = HashMap::new();

  for row in rows {
    if row.component != query.component
      || row.lang != query.lang
      || row.since > query.max_since
      || row.timemodified > query.as_of
      || (!query.strnames.is_empty() && !query.strnames.contains(&row.strname))
    {
      continue;
    }
    if let Some(text) = &row.text {
      let newer = last_texts
        .get(&row.strname)
        .is_none_or(|(t, id, _)| (*t, *id) < row.recency());
      if newer {
        last_texts.insert(row.strname.clone(), (row.timemodified, row.id, text.clone()));
      }
    }
    match winners.get(&row.strname) {
      Some(current) if current.recency() >= row.recency() => {}
      Some(_) => {
        winners.insert(row.strname.clone(), row);
      }
      None => {
        order.push(row.strname.clone());
        winners.insert(row.strname.clone(), row);
      }
    }
  }

  order
    .into_iter()
    .filter_map(|name| winners.remove(&name))
    .filter(|r| query.include_tombstones || !r.deleted())
    .map(|mut r| {
      if r.deleted() && query.include_history_of_deleted {
        r.last_text = last_texts.get(&r.strname).map(|(_, _, t)| t.clone());
      }
      r
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  fn row(id: i64, name: &str, text: Option<&str>, since: u32, t: Timestamp) -> Revision {
    Revision {
      id,
      commit_id: id,
      component: "moodle".into(),
      lang: "en".into(),
      strname: name.into(),
      text: text.map(str::to_string),
      since,
      timemodified: t,
      last_text: None,
    }
  }

  fn query(max_since: u32, as_of: Timestamp) -> SnapshotQuery {
    SnapshotQuery {
      component:                  "moodle".into(),
      lang:                       "en".into(),
      max_since,
      as_of,
      include_tombstones:         false,
      include_history_of_deleted: false,
      strnames:                   vec![],
    }
  }

  #[test]
  fn source_roundtrips_as_text() {
    assert_eq!(CommitSource::UpToDate.to_string(), "uptodate");
    assert_eq!(CommitSource::CommitScript.to_string(), "commitscript");
    assert_eq!(CommitSource::from_str("automerge").unwrap(), CommitSource::AutoMerge);
    assert!(CommitSource::from_str("nonsense").is_err());
  }

  #[test]
  fn timestamp_beats_insertion_order() {
    let rows = vec![row(1, "welcome", Some("Welcome"), 20, 100), row(2, "welcome", Some("Welcome!"), 20, 50)];
    let snap = select_snapshot(rows, &query(20, 1000));
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].text.as_deref(), Some("Welcome"));

    let earlier = select_snapshot(
      vec![row(1, "welcome", Some("Welcome"), 20, 100), row(2, "welcome", Some("Welcome!"), 20, 50)],
      &query(20, 60),
    );
    assert_eq!(earlier[0].text.as_deref(), Some("Welcome!"));
  }

  #[test]
  fn equal_timestamps_break_on_id() {
    let rows = vec![row(7, "x", Some("second"), 20, 10), row(3, "x", Some("first"), 20, 10)];
    let snap = select_snapshot(rows, &query(20, 10));
    assert_eq!(snap[0].text.as_deref(), Some("second"));
  }

  #[test]
  fn newer_branches_are_invisible() {
    let rows = vec![row(1, "x", Some("old"), 20, 10), row(2, "x", Some("new"), 21, 20)];
    assert_eq!(select_snapshot(rows.clone(), &query(20, 99))[0].text.as_deref(), Some("old"));
    assert_eq!(select_snapshot(rows, &query(21, 99))[0].text.as_deref(), Some("new"));
  }

  #[test]
  fn tombstones_and_last_text() {
    let rows = vec![row(1, "x", Some("A"), 20, 10), row(2, "x", None, 20, 20)];
    assert!(select_snapshot(rows.clone(), &query(20, 99)).is_empty());

    let mut q = query(20, 99);
    q.include_tombstones = true;
    let snap = select_snapshot(rows.clone(), &q);
    assert!(snap[0].deleted());
    assert_eq!(snap[0].last_text, None);

    q.include_history_of_deleted = true;
    let snap = select_snapshot(rows, &q);
    assert_eq!(snap[0].last_text.as_deref(), Some("A"));
  }
}
