use super::{Change, Changes, Policies, PolicyReport};
use crate::{ENGLISH, Error, Result, Version, revision::CommitSource, store::RevisionStore};

impl<S: RevisionStore> Policies<'_, S> {
  /// Re-commit the current translations of `ids` on `version` unchanged,
  /// with a fresh timestamp, so they no longer count as older than their
  /// English originals. An empty `ids` means every translated string.
  ///
  /// Ids without a translation on that branch are ignored.
  pub async fn mark_up_to_date(
    &self,
    component: &str,
    lang: &str,
    version: &Version,
    ids: &[String],
  ) -> Result<PolicyReport> {
    if lang == ENGLISH {
      return Err(Error::InvalidLanguage(lang.to_string()));
    }
    let index = self
      .registry
      .list_all()
      .iter()
      .position(|v| v.code == version.code)
      .ok_or_else(|| Error::UnknownVersion(version.code.to_string()))?;

    let tr = self.snapshots(component, lang, false).await?;
    let current = &tr[index];
    let restated: std::collections::BTreeMap<String, Change> = current
      .iter()
      .filter(|v| ids.is_empty() || ids.iter().any(|id| id == v.id()))
      .filter_map(|v| Some((v.id().to_string(), Change::restate(v.text()?))))
      .collect();
    if restated.is_empty() {
      return Ok(PolicyReport::default());
    }

    let mut changes = Changes::new();
    changes.insert(version.code, restated);
    Ok(
      self
        .apply(component, lang, &tr, changes, CommitSource::UpToDate, "Mark translations up to date")
        .await,
    )
  }
}
