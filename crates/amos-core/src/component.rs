//! Components: the working set of strings for one (name, language, version).
//!
//! A component is a value container. It is materialised from the revision
//! store, parsed from a language file, or assembled by hand as a set of
//! proposed changes; it never writes itself anywhere.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  ENGLISH, Error, Result, StringValue, Timestamp, Version,
  revision::SnapshotQuery,
  store::RevisionStore,
  string::{differs, validate_component, validate_id, validate_lang},
  text::clean_text,
};

// ─── Key ─────────────────────────────────────────────────────────────────────

/// Identity of a component inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
  pub name:    String,
  pub lang:    String,
  pub version: u32,
}

impl std::fmt::Display for ComponentKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}@{}", self.name, self.lang, self.version)
  }
}

// ─── Snapshot options ────────────────────────────────────────────────────────

/// Parameters for [`Component::from_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
  /// Point in time to reconstruct; defaults to now.
  pub as_of:                      Option<Timestamp>,
  /// Return deleted strings as tombstones instead of omitting them.
  pub include_tombstones:         bool,
  /// Like `include_tombstones`, and fill each tombstone's
  /// [`StringValue::last_text`]. Implies `include_tombstones`.
  pub include_history_of_deleted: bool,
}

// ─── Component ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
  name:    String,
  lang:    String,
  version: Version,
  strings: BTreeMap<String, StringValue>,
}

impl Component {
  /// An empty component. Fails on an invalid name or language code.
  pub fn new(name: impl Into<String>, lang: impl Into<String>, version: Version) -> Result<Self> {
    let name = name.into();
    let lang = lang.into();
    validate_component(&name)?;
    validate_lang(&lang)?;
    Ok(Self { name, lang, version, strings: BTreeMap::new() })
  }

  /// Re-run the constructor checks on a component that bypassed them, such
  /// as one deserialized from a stored stage.
  pub(crate) fn validate(&self) -> Result<()> {
    validate_component(&self.name)?;
    validate_lang(&self.lang)?;
    for (key, value) in &self.strings {
      validate_id(value.id())?;
      if key != value.id() {
        return Err(Error::InvalidKeySyntax(key.clone()));
      }
    }
    Ok(())
  }

  /// Reconstruct the component as stored in `store`.
  ///
  /// Fails with [`Error::UnknownLanguage`] when the store has never seen
  /// `lang`; English is always known.
  pub async fn from_snapshot<S: RevisionStore>(
    store: &S,
    name: &str,
    lang: &str,
    version: &Version,
    options: SnapshotOptions,
  ) -> Result<Self> {
    validate_component(name)?;
    validate_lang(lang)?;
    if lang != ENGLISH {
      let known = store.list_languages().await.map_err(Error::store)?;
      if !known.iter().any(|l| l == lang) {
        return Err(Error::UnknownLanguage(lang.to_string()));
      }
    }
    Self::load(store, name, lang, version, options).await
  }

  /// Snapshot without the language check; a never-seen language yields an
  /// empty component.
  pub(crate) async fn load<S: RevisionStore>(
    store: &S,
    name: &str,
    lang: &str,
    version: &Version,
    options: SnapshotOptions,
  ) -> Result<Self> {
    let query = SnapshotQuery {
      component:                  name.to_string(),
      lang:                       lang.to_string(),
      max_since:                  version.code,
      as_of:                      options.as_of.unwrap_or_else(crate::now),
      include_tombstones:         options.include_tombstones || options.include_history_of_deleted,
      include_history_of_deleted: options.include_history_of_deleted,
      strnames:                   vec![],
    };
    let rows = store.snapshot(query).await.map_err(Error::store)?;

    let mut component = Self::new(name, lang, version.clone())?;
    for row in rows {
      let value = row.into_string_value();
      component.strings.insert(value.id().to_string(), value);
    }
    Ok(component)
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn lang(&self) -> &str { &self.lang }

  pub fn version(&self) -> &Version { &self.version }

  pub fn key(&self) -> ComponentKey {
    ComponentKey {
      name:    self.name.clone(),
      lang:    self.lang.clone(),
      version: self.version.code,
    }
  }

  // ── Strings ───────────────────────────────────────────────────────────

  /// Add a string. An existing key is an error unless `force_overwrite`.
  pub fn add_string(&mut self, value: StringValue, force_overwrite: bool) -> Result<()> {
    if !force_overwrite && self.strings.contains_key(value.id()) {
      return Err(Error::DuplicateKey {
        component: self.key().to_string(),
        id:        value.id().to_string(),
      });
    }
    self.strings.insert(value.id().to_string(), value);
    Ok(())
  }

  pub fn get_string(&self, id: &str) -> Option<&StringValue> { self.strings.get(id) }

  pub fn has_string(&self, id: &str) -> bool { self.strings.contains_key(id) }

  /// Whether the component holds any string at all.
  pub fn has_strings(&self) -> bool { !self.strings.is_empty() }

  /// Remove a string; a missing key is a no-op.
  pub fn unlink_string(&mut self, id: &str) -> Option<StringValue> { self.strings.remove(id) }

  pub fn len(&self) -> usize { self.strings.len() }

  pub fn is_empty(&self) -> bool { self.strings.is_empty() }

  pub fn clear(&mut self) { self.strings.clear(); }

  /// Iterate over the strings. Each call starts from the beginning.
  pub fn iter(&self) -> impl Iterator<Item = &StringValue> + '_ { self.strings.values() }

  /// String ids in key order.
  pub fn ids(&self) -> impl Iterator<Item = &str> + '_ { self.strings.keys().map(String::as_str) }

  pub(crate) fn retain(&mut self, mut keep: impl FnMut(&StringValue) -> bool) {
    self.strings.retain(|_, v| keep(v));
  }

  pub fn into_strings(self) -> impl Iterator<Item = StringValue> { self.strings.into_values() }

  // ── Set operations ────────────────────────────────────────────────────

  /// Remove every string whose key has no live string in `other`.
  ///
  /// Returns the removed keys. Used to drop translations of strings that no
  /// longer exist in English.
  pub fn intersect(&mut self, other: &Component) -> Vec<String> {
    let removed: Vec<String> = self
      .strings
      .keys()
      .filter(|id| other.get_string(id).is_none_or(StringValue::deleted))
      .cloned()
      .collect();
    for id in &removed {
      self.strings.remove(id);
    }
    removed
  }

  /// Remove every live string whose text is identical in `other`.
  ///
  /// Returns the removed keys. Used to drop pending fixes that have been
  /// merged upstream.
  pub fn complement(&mut self, other: &Component) -> Vec<String> {
    let removed: Vec<String> = self
      .strings
      .values()
      .filter(|v| {
        !v.deleted()
          && other
            .get_string(v.id())
            .is_some_and(|o| !o.deleted() && !differs(v, Some(o)))
      })
      .map(|v| v.id().to_string())
      .collect();
    for id in &removed {
      self.strings.remove(id);
    }
    removed
  }

  /// Normalize every text for this component's version format.
  pub fn clean_texts(&mut self) {
    let format = self.version.format();
    for value in self.strings.values_mut() {
      if let Some(text) = value.text() {
        let cleaned = clean_text(text, format);
        value.set_text(cleaned);
      }
    }
  }
}

impl<'a> IntoIterator for &'a Component {
  type Item = &'a StringValue;
  type IntoIter = std::collections::btree_map::Values<'a, String, StringValue>;

  fn into_iter(self) -> Self::IntoIter { self.strings.values() }
}
