//! A single string value and identifier validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, Timestamp};

static STRING_ID: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9\.:/_-]*$").expect("valid regex"));

static COMPONENT_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

const MAX_ID_LEN: usize = 255;

/// Validate a string identifier.
pub fn validate_id(id: &str) -> Result<()> {
  if id.len() > MAX_ID_LEN || !STRING_ID.is_match(id) {
    return Err(Error::InvalidKeySyntax(id.to_string()));
  }
  Ok(())
}

/// Validate a component name such as `moodle` or `mod_forum`.
pub fn validate_component(name: &str) -> Result<()> {
  if !COMPONENT_NAME.is_match(name) {
    return Err(Error::InvalidComponentName(name.to_string()));
  }
  Ok(())
}

/// Validate a language code such as `cs`, `pt_br` or `en_fix`.
pub fn validate_lang(lang: &str) -> Result<()> {
  if !COMPONENT_NAME.is_match(lang) {
    return Err(Error::InvalidLanguage(lang.to_string()));
  }
  Ok(())
}

// ─── StringValue ─────────────────────────────────────────────────────────────

/// One string of a component. A value without text is a tombstone: it
/// records that the string was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringValue {
  id:           String,
  text:         Option<String>,
  timemodified: Option<Timestamp>,
  /// Text the string had before it was deleted. Only ever set on tombstones
  /// returned by a snapshot that asked for deleted-string history.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  last_text:    Option<String>,
}

impl StringValue {
  /// A live string. Fails with [`Error::InvalidKeySyntax`] on a bad id.
  pub fn new(id: impl Into<String>, text: impl Into<String>) -> Result<Self> {
    let id = id.into();
    validate_id(&id)?;
    Ok(Self { id, text: Some(text.into()), timemodified: None, last_text: None })
  }

  /// A tombstone marking `id` as deleted.
  pub fn tombstone(id: impl Into<String>) -> Result<Self> {
    let id = id.into();
    validate_id(&id)?;
    Ok(Self { id, text: None, timemodified: None, last_text: None })
  }

  /// Rebuild a value from stored parts; the id was validated on its way in.
  pub(crate) fn from_stored(
    id: String,
    text: Option<String>,
    timemodified: Timestamp,
    last_text: Option<String>,
  ) -> Self {
    let last_text = if text.is_none() { last_text } else { None };
    Self { id, text, timemodified: Some(timemodified), last_text }
  }

  /// Set the modification time.
  pub fn at(mut self, timemodified: Timestamp) -> Self {
    self.timemodified = Some(timemodified);
    self
  }

  pub fn id(&self) -> &str { &self.id }

  pub fn text(&self) -> Option<&str> { self.text.as_deref() }

  pub fn timemodified(&self) -> Option<Timestamp> { self.timemodified }

  pub fn last_text(&self) -> Option<&str> { self.last_text.as_deref() }

  pub fn deleted(&self) -> bool { self.text.is_none() }

  pub(crate) fn set_text(&mut self, text: String) {
    if self.text.is_some() {
      self.text = Some(text);
    }
  }
}

/// Whether `staged` would change `current`.
///
/// Texts are compared after trimming. A tombstone never differs from an
/// absent value or from another tombstone.
pub fn differs(staged: &StringValue, current: Option<&StringValue>) -> bool {
  match (staged.text(), current.and_then(StringValue::text)) {
    (None, None) => false,
    (Some(a), Some(b)) => a.trim() != b.trim(),
    _ => true,
  }
}
