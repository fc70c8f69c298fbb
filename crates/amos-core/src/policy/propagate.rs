//! Carrying translations to branches whose English is identical.

use std::collections::BTreeSet;

use super::{Change, Changes, Policies, PolicyReport};
use crate::{
  Component, ENGLISH, Result, StringValue, revision::CommitSource, store::RevisionStore,
};

/// Parameters for [`Policies::backport`].
#[derive(Debug, Clone, Default)]
pub struct BackportOptions {
  /// Only these languages; every translation when `None`.
  pub languages: Option<Vec<String>>,
  /// Only these version codes; every translatable version when `None`.
  pub versions:  Option<Vec<u32>>,
}

/// Walk the branches at `order` (indices into `codes`) and copy each
/// translation into the following branches that lack it, for as long as
/// their English text matches the English the translation was made for.
///
/// A branch without the English string, or with a different English text,
/// stops the carry. Copies already planned in `changes` count as present.
fn walk(order: &[usize], codes: &[u32], en: &[Component], tr: &[Component], changes: &mut Changes) {
  let keys: BTreeSet<&str> = order.iter().flat_map(|&i| tr[i].ids()).collect();

  for key in keys {
    let mut carry: Option<(String, String)> = None;
    for &i in order {
      let Some(english) = en[i].get_string(key).and_then(StringValue::text) else {
        carry = None;
        continue;
      };

      let own = tr[i]
        .get_string(key)
        .and_then(StringValue::text)
        .map(str::to_string)
        .or_else(|| {
          changes
            .get(&codes[i])
            .and_then(|m| m.get(key))
            .and_then(|c| c.text.clone())
        });
      if let Some(text) = own {
        carry = Some((english.to_string(), text));
        continue;
      }

      let carried = carry
        .as_ref()
        .filter(|(source, _)| source.trim() == english.trim())
        .map(|(_, text)| text.clone());
      match carried {
        Some(text) => {
          changes
            .entry(codes[i])
            .or_default()
            .insert(key.to_string(), Change::set(text));
        }
        None => carry = None,
      }
    }
  }
}

impl<S: RevisionStore> Policies<'_, S> {
  fn translatable_indices(&self, only: Option<&[u32]>) -> Vec<usize> {
    self
      .registry
      .list_all()
      .iter()
      .enumerate()
      .filter(|(_, v)| v.translatable && only.is_none_or(|o| o.contains(&v.code)))
      .map(|(i, _)| i)
      .collect()
  }

  fn codes(&self) -> Vec<u32> { self.registry.list_all().iter().map(|v| v.code).collect() }

  /// Fill missing translations from the nearest branch with the same
  /// English, newer branches first, then older ones.
  pub async fn auto_merge(&self, component: &str) -> Result<PolicyReport> {
    let ascending = self.translatable_indices(None);
    let descending: Vec<usize> = ascending.iter().rev().copied().collect();
    self
      .propagate(
        component,
        None,
        &[descending.as_slice(), ascending.as_slice()],
        CommitSource::AutoMerge,
        "Auto-merge translations",
      )
      .await
  }

  /// Copy translations from newer branches to older ones lacking them.
  pub async fn backport(&self, component: &str, options: &BackportOptions) -> Result<PolicyReport> {
    let descending: Vec<usize> = self
      .translatable_indices(options.versions.as_deref())
      .into_iter()
      .rev()
      .collect();
    self
      .propagate(
        component,
        options.languages.as_deref(),
        &[descending.as_slice()],
        CommitSource::Backport,
        "Backport translations",
      )
      .await
  }

  async fn propagate(
    &self,
    component: &str,
    languages: Option<&[String]>,
    passes: &[&[usize]],
    source: CommitSource,
    message: &str,
  ) -> Result<PolicyReport> {
    let codes = self.codes();
    let en = self.snapshots(component, ENGLISH, false).await?;
    let mut report = PolicyReport::default();

    for lang in self.translations(languages).await? {
      let tr = match self.snapshots(component, &lang, false).await {
        Ok(tr) => tr,
        Err(error) => {
          report.fail(format!("{component}/{lang}"), error);
          continue;
        }
      };

      let mut changes = Changes::new();
      for order in passes {
        walk(order, &codes, &en, &tr, &mut changes);
      }
      if changes.is_empty() {
        continue;
      }

      tracing::info!(component, lang = %lang, branches = changes.len(), "{message}");
      report.merge(self.apply(component, &lang, &tr, changes, source, message).await);
    }
    Ok(report)
  }
}
