//! In-memory [`RevisionStore`] and [`StageStore`].
//!
//! Holds the whole log in a `Vec` behind a tokio `RwLock`. Used by tests and
//! dry runs; semantics match the SQLite backend.

use std::{collections::HashMap, collections::HashSet, sync::Arc};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
  revision::{
    Commit, HistoryQuery, NewCommit, NewRevision, Revision, SnapshotQuery, select_snapshot,
  },
  store::{RevisionStore, StageStore},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("commit contains no revisions")]
  EmptyCommit,

  #[error("duplicate revision for {0} within one commit")]
  DuplicateRevision(String),
}

#[derive(Default)]
struct Inner {
  commits:   Vec<Commit>,
  revisions: Vec<Revision>,
  stages:    HashMap<(i64, String), String>,
}

/// A store that lives only as long as the process.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Number of revision rows in the log.
  pub async fn revision_count(&self) -> usize { self.inner.read().await.revisions.len() }
}

fn check_unique(revisions: &[NewRevision]) -> Result<(), MemoryError> {
  let mut seen = HashSet::new();
  for r in revisions {
    if !seen.insert((&r.component, &r.lang, r.since, &r.strname)) {
      return Err(MemoryError::DuplicateRevision(format!(
        "{}/{}@{}:{}",
        r.component, r.lang, r.since, r.strname
      )));
    }
  }
  Ok(())
}

impl RevisionStore for MemoryStore {
  type Error = MemoryError;

  async fn commit(&self, commit: NewCommit, revisions: Vec<NewRevision>) -> Result<Commit, MemoryError> {
    if revisions.is_empty() {
      return Err(MemoryError::EmptyCommit);
    }
    // Validate before touching the log so a failure leaves nothing behind.
    check_unique(&revisions)?;

    let mut inner = self.inner.write().await;
    let commit = Commit {
      id:             inner.commits.len() as i64 + 1,
      time_committed: commit.time_committed,
      meta:           commit.meta,
    };
    for r in revisions {
      let id = inner.revisions.len() as i64 + 1;
      inner.revisions.push(Revision {
        id,
        commit_id: commit.id,
        component: r.component,
        lang: r.lang,
        strname: r.strname,
        text: r.text,
        since: r.since,
        timemodified: r.timemodified,
        last_text: None,
      });
    }
    inner.commits.push(commit.clone());
    Ok(commit)
  }

  async fn snapshot(&self, query: SnapshotQuery) -> Result<Vec<Revision>, MemoryError> {
    let inner = self.inner.read().await;
    Ok(select_snapshot(inner.revisions.iter().cloned(), &query))
  }

  async fn history(&self, query: HistoryQuery) -> Result<Vec<Revision>, MemoryError> {
    let inner = self.inner.read().await;
    let mut rows: Vec<Revision> = inner
      .revisions
      .iter()
      .filter(|r| {
        r.component == query.component
          && r.strname == query.strname
          && query.lang.as_ref().is_none_or(|l| &r.lang == l)
      })
      .cloned()
      .collect();
    rows.sort_by_key(Revision::recency);
    Ok(rows)
  }

  async fn get_commit(&self, id: i64) -> Result<Option<Commit>, MemoryError> {
    let inner = self.inner.read().await;
    Ok(inner.commits.iter().find(|c| c.id == id).cloned())
  }

  async fn list_components(&self) -> Result<Vec<String>, MemoryError> {
    let inner = self.inner.read().await;
    let mut names: Vec<String> = inner.revisions.iter().map(|r| r.component.clone()).collect();
    names.sort();
    names.dedup();
    Ok(names)
  }

  async fn list_languages(&self) -> Result<Vec<String>, MemoryError> {
    let inner = self.inner.read().await;
    let mut langs: Vec<String> = inner.revisions.iter().map(|r| r.lang.clone()).collect();
    langs.sort();
    langs.dedup();
    Ok(langs)
  }
}

impl StageStore for MemoryStore {
  type Error = MemoryError;

  async fn load_stage(&self, user_id: i64, token: String) -> Result<Option<String>, MemoryError> {
    Ok(self.inner.read().await.stages.get(&(user_id, token)).cloned())
  }

  async fn save_stage(&self, user_id: i64, token: String, payload: String) -> Result<(), MemoryError> {
    self.inner.write().await.stages.insert((user_id, token), payload);
    Ok(())
  }

  async fn delete_stage(&self, user_id: i64, token: String) -> Result<(), MemoryError> {
    self.inner.write().await.stages.remove(&(user_id, token));
    Ok(())
  }
}
