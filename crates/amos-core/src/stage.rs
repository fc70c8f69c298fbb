//! The staging area: proposed changes on their way into the revision store.
//!
//! Clients add components holding the state they want, [`Stage::rebase`]
//! reduces them to the real delta against the store, and [`Stage::commit`]
//! appends that delta atomically as one commit.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  Error, Result, StringValue, Timestamp,
  component::{Component, ComponentKey, SnapshotOptions},
  revision::{Commit, CommitMeta, NewCommit, NewRevision},
  store::RevisionStore,
  string::differs,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Parameters for [`Stage::rebase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebaseOptions {
  /// Reference instant of the comparison snapshot; defaults to now.
  pub as_of:             Option<Timestamp>,
  /// Treat each staged component as the complete new state: strings present
  /// in the store but missing from the stage are staged as deletions.
  pub complete_snapshot: bool,
}

/// Parameters for [`Stage::commit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
  /// Commit the stage exactly as it is, without the implicit rebase.
  pub skip_rebase: bool,
  /// Commit time, also used for strings without their own timestamp and as
  /// the rebase reference; defaults to now.
  pub timestamp:   Option<Timestamp>,
}

/// What [`Stage::commit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
  Committed(Commit),
  /// The stage held no real change; nothing was written.
  NothingToCommit,
}

impl CommitOutcome {
  pub fn commit(&self) -> Option<&Commit> {
    match self {
      Self::Committed(c) => Some(c),
      Self::NothingToCommit => None,
    }
  }

  pub fn is_committed(&self) -> bool { matches!(self, Self::Committed(_)) }
}

// ─── Stage ───────────────────────────────────────────────────────────────────

/// An ordered set of components keyed by `(name, lang, version)`.
#[derive(Debug, Clone, Default)]
pub struct Stage {
  components: BTreeMap<ComponentKey, Component>,
  /// Components already reduced to a delta. A delta is never reinterpreted
  /// as a complete snapshot, so rebasing stays idempotent.
  rebased:    BTreeSet<ComponentKey>,
}

impl Stage {
  pub fn new() -> Self { Self::default() }

  pub(crate) fn from_parts(components: Vec<Component>, rebased: Vec<ComponentKey>) -> Self {
    Self {
      components: components.into_iter().map(|c| (c.key(), c)).collect(),
      rebased:    rebased.into_iter().collect(),
    }
  }

  pub(crate) fn parts(&self) -> (Vec<&Component>, Vec<&ComponentKey>) {
    (self.components.values().collect(), self.rebased.iter().collect())
  }

  /// Stage a component, merging it into an already staged one with the same
  /// key. Any clashing string id fails the whole call unless
  /// `force_overwrite`.
  pub fn add(&mut self, component: Component, force_overwrite: bool) -> Result<()> {
    let key = component.key();
    let Some(existing) = self.components.get_mut(&key) else {
      self.components.insert(key, component);
      return Ok(());
    };

    if !force_overwrite
      && let Some(clash) = component.ids().find(|id| existing.has_string(id))
    {
      return Err(Error::DuplicateKey { component: key.to_string(), id: clash.to_string() });
    }
    for value in component.into_strings() {
      existing.add_string(value, true)?;
    }
    self.rebased.remove(&key);
    Ok(())
  }

  pub fn get(&self, name: &str, lang: &str, version: u32) -> Option<&Component> {
    self.components.get(&ComponentKey {
      name:    name.to_string(),
      lang:    lang.to_string(),
      version,
    })
  }

  /// Iterate over the staged components. Each call starts from the beginning.
  pub fn iter(&self) -> impl Iterator<Item = &Component> + '_ { self.components.values() }

  pub fn len(&self) -> usize { self.components.len() }

  pub fn is_empty(&self) -> bool { self.components.is_empty() }

  /// Total number of staged strings across all components.
  pub fn string_count(&self) -> usize { self.components.values().map(Component::len).sum() }

  pub fn clear(&mut self) {
    self.components.clear();
    self.rebased.clear();
  }

  // ── Rebase ────────────────────────────────────────────────────────────

  /// Reduce every staged component to its real delta against the store.
  ///
  /// Strings equal to the stored value are dropped. With
  /// `complete_snapshot`, stored strings missing from the stage are staged
  /// as tombstones. Components left empty are removed.
  pub async fn rebase<S: RevisionStore>(&mut self, store: &S, options: RebaseOptions) -> Result<()> {
    let as_of = options.as_of.unwrap_or_else(crate::now);
    let keys: Vec<ComponentKey> = self.components.keys().cloned().collect();

    for key in keys {
      let complete = options.complete_snapshot && !self.rebased.contains(&key);
      let Some(staged) = self.components.get_mut(&key) else { continue };

      let current = Component::load(
        store,
        &key.name,
        &key.lang,
        staged.version(),
        SnapshotOptions {
          as_of:              Some(as_of),
          include_tombstones: complete,
          ..Default::default()
        },
      )
      .await?;

      let missing: Vec<String> = if complete {
        current
          .iter()
          .filter(|v| !v.deleted() && !staged.has_string(v.id()))
          .map(|v| v.id().to_string())
          .collect()
      } else {
        Vec::new()
      };

      staged.retain(|v| differs(v, current.get_string(v.id())));
      for id in missing {
        staged.add_string(StringValue::tombstone(id)?, true)?;
      }

      if staged.is_empty() {
        self.components.remove(&key);
        self.rebased.remove(&key);
      } else {
        self.rebased.insert(key);
      }
    }
    Ok(())
  }

  // ── Commit ────────────────────────────────────────────────────────────

  /// Append the staged changes to the store as one atomic commit and drain
  /// the stage.
  ///
  /// On failure nothing is persisted and the stage is left as it was.
  pub async fn commit<S: RevisionStore>(
    &mut self,
    store: &S,
    meta: CommitMeta,
    options: CommitOptions,
  ) -> Result<CommitOutcome> {
    let time = options.timestamp.unwrap_or_else(crate::now);
    if !options.skip_rebase {
      self
        .rebase(store, RebaseOptions { as_of: Some(time), complete_snapshot: false })
        .await?;
    }
    if self.components.values().all(Component::is_empty) {
      self.clear();
      return Ok(CommitOutcome::NothingToCommit);
    }

    let revisions: Vec<NewRevision> = self
      .components
      .values()
      .flat_map(|c| {
        c.iter().map(move |v| NewRevision {
          component:    c.name().to_string(),
          lang:         c.lang().to_string(),
          strname:      v.id().to_string(),
          text:         v.text().map(str::to_string),
          since:        c.version().code,
          timemodified: v.timemodified().unwrap_or(time),
        })
      })
      .collect();
    let units = self
      .components
      .keys()
      .map(ComponentKey::to_string)
      .collect::<Vec<_>>()
      .join(", ");
    let count = revisions.len();

    match store.commit(NewCommit { meta, time_committed: time }, revisions).await {
      Ok(commit) => {
        tracing::info!(
          commit = commit.id,
          source = %commit.meta.source,
          revisions = count,
          "committed {units}"
        );
        self.clear();
        Ok(CommitOutcome::Committed(commit))
      }
      Err(e) => Err(Error::CommitFailure { units, source: Box::new(e) }),
    }
  }
}
