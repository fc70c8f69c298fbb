//! Housekeeping after English changes.

use super::{Change, Changes, Policies, PolicyReport};
use crate::{
  EN_FIX, ENGLISH, Result, StringValue, Timestamp, revision::CommitSource, store::RevisionStore,
};

impl<S: RevisionStore> Policies<'_, S> {
  /// Propagate English deletions to every translation on the same branch.
  ///
  /// With `since`, only English tombstones recorded at or after that time
  /// are considered.
  pub async fn reverse_cleanup(&self, component: &str, since: Option<Timestamp>) -> Result<PolicyReport> {
    let en = self.snapshots(component, ENGLISH, true).await?;
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
      for (english, translation) in en.iter().zip(&tr) {
        let code = english.version().code;
        if !self.is_translatable(code) {
          continue;
        }
        let removed = english
          .iter()
          .filter(|v| v.deleted())
          .filter(|v| since.is_none_or(|s| v.timemodified().is_some_and(|t| t >= s)))
          .filter(|v| translation.has_string(v.id()));
        for value in removed {
          changes
            .entry(code)
            .or_default()
            .insert(value.id().to_string(), Change::remove());
        }
      }
      if changes.is_empty() {
        continue;
      }

      report.merge(
        self
          .apply(component, &lang, &tr, changes, CommitSource::Bot, "Propagate English deletions")
          .await,
      );
    }
    Ok(report)
  }

  /// Drop pending `en_fix` entries that are no longer needed: fixes of
  /// strings gone from English and fixes identical to the current English.
  ///
  /// `aggressive` also drops fixes older than the English string they fix.
  pub async fn cleanup_en_fix(&self, component: &str, aggressive: bool) -> Result<PolicyReport> {
    let en = self.snapshots(component, ENGLISH, false).await?;
    let fixes = self.snapshots(component, EN_FIX, false).await?;

    let mut changes = Changes::new();
    for (english, fix) in en.iter().zip(&fixes) {
      let code = fix.version().code;
      if fix.is_empty() || !self.is_translatable(code) {
        continue;
      }

      let mut pending = fix.clone();
      let mut removed = pending.intersect(english);
      removed.extend(pending.complement(english));
      if aggressive {
        removed.extend(
          pending
            .iter()
            .filter(|v| {
              let fixed_at = v.timemodified().unwrap_or_default();
              english
                .get_string(v.id())
                .and_then(StringValue::timemodified)
                .is_some_and(|t| t > fixed_at)
            })
            .map(|v| v.id().to_string()),
        );
      }

      for id in removed {
        changes.entry(code).or_default().insert(id, Change::remove());
      }
    }

    if changes.is_empty() {
      return Ok(PolicyReport::default());
    }
    Ok(
      self
        .apply(component, EN_FIX, &fixes, changes, CommitSource::Bot, "Clean up en_fix")
        .await,
    )
  }
}
