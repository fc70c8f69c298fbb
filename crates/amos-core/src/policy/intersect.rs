use super::{Change, Changes, Policies, PolicyReport};
use crate::{ENGLISH, Result, revision::CommitSource, store::RevisionStore};

impl<S: RevisionStore> Policies<'_, S> {
  /// Remove translations whose key no longer exists in English on the same
  /// branch.
  pub async fn intersect(&self, component: &str) -> Result<PolicyReport> {
    let en = self.snapshots(component, ENGLISH, false).await?;
    let mut report = PolicyReport::default();

    for lang in self.translations(None).await? {
      let tr = match self.snapshots(component, &lang, false).await {
        Ok(tr) => tr,
        Err(error) => {
          report.fail(format!("{component}/{lang}"), error);
          continue;
        }
      };

      let mut changes = Changes::new();
      for (i, translation) in tr.iter().enumerate() {
        if !self.is_translatable(translation.version().code) {
          continue;
        }
        let mut kept = translation.clone();
        for id in kept.intersect(&en[i]) {
          changes
            .entry(translation.version().code)
            .or_default()
            .insert(id, Change::remove());
        }
      }
      if changes.is_empty() {
        continue;
      }

      report.merge(
        self
          .apply(component, &lang, &tr, changes, CommitSource::Bot, "Drop orphaned translations")
          .await,
      );
    }
    Ok(report)
  }
}
