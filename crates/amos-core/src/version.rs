//! Moodle branches known to the repository.
//!
//! A [`Version`] is a branch identified by a monotonic integer `code`
//! (`20` for 2.0, `310` for 3.10, `400` for 4.0). Branch inheritance in
//! snapshots is expressed purely as integer comparison on that code.

use std::{cmp::Ordering, hash::Hash};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── String format ───────────────────────────────────────────────────────────

/// Syntax generation of string texts. Branches before 2.0 used the legacy
/// format (`$a` placeholders, escaped dollars, doubled percent signs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringFormat {
  Legacy,
  Modern,
}

impl StringFormat {
  /// Maximum number of consecutive blank lines kept by normalization.
  pub fn max_blank_lines(self) -> usize {
    match self {
      Self::Legacy => 1,
      Self::Modern => 2,
    }
  }
}

// ─── Version ─────────────────────────────────────────────────────────────────

/// First version code using [`StringFormat::Modern`].
pub const MODERN_FORMAT_SINCE: u32 = 20;

/// An immutable branch descriptor. Equality and ordering use `code` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
  pub code:         u32,
  /// Display label, e.g. `"3.10"`.
  pub label:        String,
  /// Directory name used by exports.
  pub dir:          String,
  /// Upstream git branch name, e.g. `"MOODLE_310_STABLE"`.
  pub branch:       String,
  pub translatable: bool,
}

impl Version {
  /// Derive a version from a `major.minor` label using Moodle's numbering.
  pub fn from_label(label: &str, translatable: bool) -> Result<Self> {
    let (major, minor) = label
      .split_once('.')
      .and_then(|(a, b)| Some((a.parse::<u32>().ok()?, b.parse::<u32>().ok()?)))
      .ok_or_else(|| Error::UnknownVersion(label.to_string()))?;
    Ok(Self::moodle(major, minor, translatable))
  }

  fn moodle(major: u32, minor: u32, translatable: bool) -> Self {
    let code = if major >= 4 || minor >= 10 {
      major * 100 + minor
    } else {
      major * 10 + minor
    };
    Self {
      code,
      label: format!("{major}.{minor}"),
      dir: format!("{major}.{minor}"),
      branch: format!("MOODLE_{code}_STABLE"),
      translatable,
    }
  }

  pub fn format(&self) -> StringFormat {
    if self.code < MODERN_FORMAT_SINCE {
      StringFormat::Legacy
    } else {
      StringFormat::Modern
    }
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Self) -> bool { self.code == other.code }
}

impl Eq for Version {}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering { self.code.cmp(&other.code) }
}

impl Hash for Version {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.code.hash(state); }
}

impl std::fmt::Display for Version {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.label)
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// One entry of the `versions` configuration list.
///
/// Only `label` is required; the rest is derived from it when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionConfig {
  pub label:        String,
  pub code:         Option<u32>,
  pub dir:          Option<String>,
  pub branch:       Option<String>,
  #[serde(default = "default_translatable")]
  pub translatable: bool,
}

fn default_translatable() -> bool { true }

// ─── Registry ────────────────────────────────────────────────────────────────

/// The ordered set of branches, loaded once at start-up.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
  versions: Vec<Version>,
}

impl VersionRegistry {
  /// Build a registry. Versions are sorted by code; duplicate codes and an
  /// empty list are rejected.
  pub fn new(mut versions: Vec<Version>) -> Result<Self> {
    if versions.is_empty() {
      return Err(Error::InvalidRegistry("no versions defined".into()));
    }
    versions.sort();
    if let Some(w) = versions.windows(2).find(|w| w[0].code == w[1].code) {
      return Err(Error::InvalidRegistry(format!(
        "duplicate version code {}",
        w[0].code
      )));
    }
    Ok(Self { versions })
  }

  pub fn from_config(entries: &[VersionConfig]) -> Result<Self> {
    let versions = entries
      .iter()
      .map(|e| {
        let mut v = Version::from_label(&e.label, e.translatable)?;
        if let Some(code) = e.code {
          v.code = code;
          v.branch = format!("MOODLE_{code}_STABLE");
        }
        if let Some(dir) = &e.dir {
          v.dir = dir.clone();
        }
        if let Some(branch) = &e.branch {
          v.branch = branch.clone();
        }
        Ok(v)
      })
      .collect::<Result<Vec<_>>>()?;
    Self::new(versions)
  }

  /// Built-in Moodle branch list: 1.9 (frozen) through 4.4.
  pub fn moodle() -> Self {
    let mut versions = vec![Version::moodle(1, 9, false)];
    versions.extend((0..=9).map(|minor| Version::moodle(2, minor, true)));
    versions.extend((0..=11).map(|minor| Version::moodle(3, minor, true)));
    versions.extend((0..=4).map(|minor| Version::moodle(4, minor, true)));
    Self { versions }
  }

  pub fn by_code(&self, code: u32) -> Result<&Version> {
    self
      .versions
      .iter()
      .find(|v| v.code == code)
      .ok_or_else(|| Error::UnknownVersion(code.to_string()))
  }

  pub fn by_branch(&self, branch: &str) -> Result<&Version> {
    self
      .versions
      .iter()
      .find(|v| v.branch == branch)
      .ok_or_else(|| Error::UnknownVersion(branch.to_string()))
  }

  pub fn by_dir(&self, dir: &str) -> Result<&Version> {
    self
      .versions
      .iter()
      .find(|v| v.dir == dir)
      .ok_or_else(|| Error::UnknownVersion(dir.to_string()))
  }

  /// Resolve a user-supplied reference: a code, a branch name or a directory.
  pub fn resolve(&self, reference: &str) -> Result<&Version> {
    if let Ok(code) = reference.parse::<u32>() {
      return self.by_code(code);
    }
    self
      .by_branch(reference)
      .or_else(|_| self.by_dir(reference))
  }

  pub fn latest(&self) -> &Version {
    // `new` rejects empty registries.
    &self.versions[self.versions.len() - 1]
  }

  pub fn list_all(&self) -> &[Version] { &self.versions }

  /// Versions with `min <= code <= max` (unbounded above when `max` is None).
  pub fn list_range(&self, min: u32, max: Option<u32>) -> Vec<&Version> {
    self
      .versions
      .iter()
      .filter(|v| v.code >= min && max.is_none_or(|m| v.code <= m))
      .collect()
  }

  /// Translatable versions only, oldest first.
  pub fn list_supported(&self) -> Vec<&Version> {
    self.versions.iter().filter(|v| v.translatable).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_map_to_moodle_codes() {
    assert_eq!(Version::from_label("1.9", false).unwrap().code, 19);
    assert_eq!(Version::from_label("2.0", true).unwrap().code, 20);
    assert_eq!(Version::from_label("3.9", true).unwrap().code, 39);
    assert_eq!(Version::from_label("3.10", true).unwrap().code, 310);
    assert_eq!(Version::from_label("4.1", true).unwrap().code, 401);

    let v = Version::from_label("3.10", true).unwrap();
    assert_eq!(v.branch, "MOODLE_310_STABLE");
    assert_eq!(v.dir, "3.10");
  }

  #[test]
  fn bad_label_is_unknown_version() {
    assert!(matches!(
      Version::from_label("master", true),
      Err(Error::UnknownVersion(_))
    ));
  }

  #[test]
  fn codes_are_totally_ordered() {
    let reg = VersionRegistry::moodle();
    let codes: Vec<u32> = reg.list_all().iter().map(|v| v.code).collect();
    let mut sorted = codes.clone();
    sorted.sort();
    assert_eq!(codes, sorted);
    assert!(reg.by_code(39).unwrap() < reg.by_code(310).unwrap());
    assert!(reg.by_code(311).unwrap() < reg.by_code(400).unwrap());
  }

  #[test]
  fn lookups() {
    let reg = VersionRegistry::moodle();
    assert_eq!(reg.by_branch("MOODLE_310_STABLE").unwrap().code, 310);
    assert_eq!(reg.by_dir("2.0").unwrap().code, 20);
    assert_eq!(reg.resolve("27").unwrap().label, "2.7");
    assert_eq!(reg.resolve("3.5").unwrap().code, 35);
    assert_eq!(reg.latest().code, 404);
    assert!(matches!(reg.by_code(99), Err(Error::UnknownVersion(_))));
  }

  #[test]
  fn ranges_and_supported() {
    let reg = VersionRegistry::moodle();
    let range: Vec<u32> = reg.list_range(38, Some(311)).iter().map(|v| v.code).collect();
    assert_eq!(range, vec![38, 39, 310, 311]);
    assert_eq!(reg.list_range(403, None).len(), 2);
    assert!(reg.list_supported().iter().all(|v| v.code >= 20));
    assert_eq!(reg.list_supported().len(), reg.list_all().len() - 1);
  }

  #[test]
  fn format_by_code() {
    let reg = VersionRegistry::moodle();
    assert_eq!(reg.by_code(19).unwrap().format(), StringFormat::Legacy);
    assert_eq!(reg.by_code(20).unwrap().format(), StringFormat::Modern);
  }

  #[test]
  fn registry_from_config() {
    let cfg = vec![
      VersionConfig {
        label:        "2.1".into(),
        code:         None,
        dir:          None,
        branch:       None,
        translatable: true,
      },
      VersionConfig {
        label:        "2.0".into(),
        code:         None,
        dir:          Some("20".into()),
        branch:       None,
        translatable: false,
      },
    ];
    let reg = VersionRegistry::from_config(&cfg).unwrap();
    assert_eq!(reg.list_all()[0].code, 20);
    assert_eq!(reg.by_dir("20").unwrap().code, 20);
    assert_eq!(reg.list_supported().len(), 1);
  }

  #[test]
  fn duplicate_codes_rejected() {
    let v = Version::from_label("2.0", true).unwrap();
    let r = VersionRegistry::new(vec![v.clone(), v]);
    assert!(matches!(r, Err(Error::InvalidRegistry(_))));
    assert!(VersionRegistry::new(vec![]).is_err());
  }
}
