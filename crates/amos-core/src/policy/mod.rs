//! Batch merge and propagation policies.
//!
//! Every policy reads snapshots, decides which values some branches should
//! show instead of what they show now, and turns that into revisions. A
//! revision at `since = v` is visible on every branch from `v` up, so the
//! planner also emits guard revisions that keep newer branches showing what
//! they showed before, unless a change was asked for there too.
//!
//! Work is committed one `(component, language, branch)` unit at a time,
//! oldest branch first. A failing unit is logged and reported, and the rest
//! of that language is skipped; other languages carry on.

mod cleanup;
mod intersect;
mod propagate;
mod uptodate;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

pub use propagate::BackportOptions;

use crate::{
  EN_FIX, ENGLISH, Error, Result, Stage, StringValue, Timestamp, Version, VersionRegistry,
  component::{Component, SnapshotOptions},
  revision::{Commit, CommitMeta, CommitSource},
  stage::{CommitOptions, CommitOutcome},
  store::RevisionStore,
};

/// Author recorded on commits made by policies.
pub const BOT_USER_INFO: &str = "AMOS-bot <amos@moodle.org>";

// ─── Report ──────────────────────────────────────────────────────────────────

/// A unit of work that could not be committed.
#[derive(Debug)]
pub struct UnitFailure {
  /// `component/lang@version` of the failed unit.
  pub unit:  String,
  pub error: Error,
}

/// Outcome of a policy run.
#[derive(Debug, Default)]
pub struct PolicyReport {
  pub commits:  Vec<Commit>,
  pub failures: Vec<UnitFailure>,
}

impl PolicyReport {
  pub fn is_clean(&self) -> bool { self.failures.is_empty() }

  fn merge(&mut self, other: PolicyReport) {
    self.commits.extend(other.commits);
    self.failures.extend(other.failures);
  }

  fn fail(&mut self, unit: String, error: Error) {
    tracing::warn!(unit = %unit, %error, "policy unit failed");
    self.failures.push(UnitFailure { unit, error });
  }
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// A value one branch should show after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Change {
  /// `None` asks for the string to be gone.
  text:  Option<String>,
  /// Write a revision even if the branch already shows this value.
  force: bool,
}

impl Change {
  pub(crate) fn set(text: impl Into<String>) -> Self { Self { text: Some(text.into()), force: false } }

  pub(crate) fn remove() -> Self { Self { text: None, force: false } }

  pub(crate) fn restate(text: impl Into<String>) -> Self { Self { text: Some(text.into()), force: true } }
}

/// Requested changes: version code → string id → change.
pub(crate) type Changes = BTreeMap<u32, BTreeMap<String, Change>>;

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(x), Some(y)) => x.trim() == y.trim(),
    _ => false,
  }
}

/// Minimal revisions making every branch show the requested values while
/// all other branches keep what they show in `before`.
///
/// `before[i]` is the snapshot of `versions[i]`; versions are ascending.
/// New revisions share one timestamp newer than everything stored and are
/// inserted oldest branch first, so on any branch the new revision with the
/// highest `since` wins.
pub(crate) fn plan(
  versions: &[Version],
  before: &[Component],
  changes: &Changes,
) -> BTreeMap<u32, Vec<(String, Option<String>)>> {
  let ids: BTreeSet<&str> = changes
    .values()
    .flat_map(|m| m.keys().map(String::as_str))
    .collect();

  let mut rows: BTreeMap<u32, Vec<(String, Option<String>)>> = BTreeMap::new();
  for id in ids {
    let mut fresh: Option<Option<&str>> = None;
    for (version, snapshot) in versions.iter().zip(before) {
      let prior = snapshot.get_string(id).and_then(StringValue::text);
      let change = changes.get(&version.code).and_then(|m| m.get(id));
      let desired = change.map_or(prior, |c| c.text.as_deref());
      let effective = fresh.unwrap_or(prior);

      if change.is_some_and(|c| c.force) || !same_text(effective, desired) {
        rows
          .entry(version.code)
          .or_default()
          .push((id.to_string(), desired.map(str::to_string)));
        fresh = Some(desired);
      }
    }
  }
  rows
}

// ─── Runner ──────────────────────────────────────────────────────────────────

/// Entry point for the batch policies over one store and registry.
pub struct Policies<'a, S> {
  store:    &'a S,
  registry: &'a VersionRegistry,
  time:     Timestamp,
}

impl<'a, S: RevisionStore> Policies<'a, S> {
  pub fn new(store: &'a S, registry: &'a VersionRegistry) -> Self {
    Self { store, registry, time: crate::now() }
  }

  /// Run as of `time`: snapshots are read and revisions stamped at it.
  pub fn at(mut self, time: Timestamp) -> Self {
    self.time = time;
    self
  }

  /// Snapshots of `component` in `lang` for every registered version,
  /// oldest first.
  async fn snapshots(&self, component: &str, lang: &str, tombstones: bool) -> Result<Vec<Component>> {
    let mut out = Vec::with_capacity(self.registry.list_all().len());
    for version in self.registry.list_all() {
      let options = SnapshotOptions {
        as_of:              Some(self.time),
        include_tombstones: tombstones,
        ..Default::default()
      };
      out.push(Component::load(self.store, component, lang, version, options).await?);
    }
    Ok(out)
  }

  /// Translation languages known to the store: everything but `en` and
  /// `en_fix`, optionally restricted to `only`.
  async fn translations(&self, only: Option<&[String]>) -> Result<Vec<String>> {
    let langs = self.store.list_languages().await.map_err(Error::store)?;
    Ok(
      langs
        .into_iter()
        .filter(|l| l != ENGLISH && l != EN_FIX)
        .filter(|l| only.is_none_or(|o| o.contains(l)))
        .collect(),
    )
  }

  fn is_translatable(&self, code: u32) -> bool {
    self.registry.by_code(code).is_ok_and(|v| v.translatable)
  }

  /// Plan and commit `changes` for one component and language.
  async fn apply(
    &self,
    component: &str,
    lang: &str,
    before: &[Component],
    changes: Changes,
    source: CommitSource,
    message: &str,
  ) -> PolicyReport {
    let mut report = PolicyReport::default();
    let skip_rebase = changes.values().flat_map(BTreeMap::values).any(|c| c.force);
    let rows = plan(self.registry.list_all(), before, &changes);

    for (code, values) in rows {
      let unit = format!("{component}/{lang}@{code}");
      match self
        .commit_unit(component, lang, code, values, source, message, skip_rebase)
        .await
      {
        Ok(CommitOutcome::Committed(commit)) => report.commits.push(commit),
        Ok(CommitOutcome::NothingToCommit) => {
          tracing::debug!(unit = %unit, "nothing to commit");
        }
        Err(error) => {
          // Later branches were planned on top of this one.
          report.fail(unit, error);
          break;
        }
      }
    }
    report
  }

  #[allow(clippy::too_many_arguments)]
  async fn commit_unit(
    &self,
    component: &str,
    lang: &str,
    code: u32,
    values: Vec<(String, Option<String>)>,
    source: CommitSource,
    message: &str,
    skip_rebase: bool,
  ) -> Result<CommitOutcome> {
    let version = self.registry.by_code(code)?;
    let mut staged = Component::new(component, lang, version.clone())?;
    for (id, text) in values {
      let value = match text {
        Some(text) => StringValue::new(id, text)?,
        None => StringValue::tombstone(id)?,
      };
      staged.add_string(value.at(self.time), true)?;
    }

    let mut stage = Stage::new();
    stage.add(staged, false)?;
    let meta = CommitMeta::new(
      format!("{message} ({component}, {lang}, {})", version.label),
      source,
      BOT_USER_INFO,
    );
    stage
      .commit(self.store, meta, CommitOptions { skip_rebase, timestamp: Some(self.time) })
      .await
  }
}
