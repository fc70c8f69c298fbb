//! Language-file codec for AMOS.
//!
//! Reads and writes the restricted subset of PHP used by string files
//! (`$string['key'] = '...';`). The reader never evaluates anything: it
//! tokenizes the file and accepts only string literals assigned to
//! `$string`, so untrusted uploads can be imported safely.
//!
//! # Quick start
//!
//! ```no_run
//! use amos_core::VersionRegistry;
//! use amos_langfile::{ImportOptions, parse};
//!
//! let registry = VersionRegistry::moodle();
//! let src = "<?php\n$string['hello'] = 'Hello {$a}';\n";
//! let options = ImportOptions::new("moodle", "en", registry.latest().clone());
//! let component = parse(src, &options).unwrap();
//! assert_eq!(component.get_string("hello").unwrap().text(), Some("Hello {$a}"));
//! ```

pub mod error;
mod parse;
mod serialize;

use std::path::Path;

use amos_core::{Component, StringFormat, StringValue, Timestamp, Version, text::fix_syntax};

pub use error::{Error, Result};

// ─── Public types ────────────────────────────────────────────────────────────

/// Where the strings of a parsed file belong and how their text is encoded.
#[derive(Debug, Clone)]
pub struct ImportOptions {
  pub name:         String,
  pub lang:         String,
  pub version:      Version,
  /// Stamp every string with this time. Unset leaves them unstamped so the
  /// stage applies its commit time.
  pub timemodified: Option<Timestamp>,
  /// Placeholder syntax of the file's texts.
  pub format:       StringFormat,
}

impl ImportOptions {
  /// Options for a modern-format file with no explicit timestamp.
  pub fn new(name: impl Into<String>, lang: impl Into<String>, version: Version) -> Self {
    Self {
      name: name.into(),
      lang: lang.into(),
      version,
      timemodified: None,
      format: StringFormat::Modern,
    }
  }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse a language file into a [`Component`].
///
/// The whole file is validated before anything is built, so an error never
/// leaves a partial component behind. A key assigned twice keeps the later
/// text.
pub fn parse(contents: &str, options: &ImportOptions) -> Result<Component> {
  let entries = parse::entries(contents)?;
  let target = options.version.format();

  let mut component =
    Component::new(options.name.clone(), options.lang.clone(), options.version.clone())?;
  for entry in entries {
    let text = fix_syntax(&entry.text, target, options.format);
    let mut value = StringValue::new(entry.key, text)?;
    if let Some(t) = options.timemodified {
      value = value.at(t);
    }
    if component.has_string(value.id()) {
      tracing::debug!(id = value.id(), line = entry.line, "string redefined; keeping the later text");
    }
    component.add_string(value, true)?;
  }
  Ok(component)
}

/// Read and parse the file at `path`. The component name is the file stem,
/// so `mod_forum.php` yields component `mod_forum`.
pub fn parse_file(
  path: impl AsRef<Path>,
  lang: &str,
  version: Version,
  format: StringFormat,
) -> Result<Component> {
  let path = path.as_ref();
  let name = path
    .file_stem()
    .and_then(|s| s.to_str())
    .ok_or_else(|| Error::FileName(path.to_path_buf()))?;
  let contents = std::fs::read_to_string(path)?;
  let options = ImportOptions {
    name: name.to_string(),
    lang: lang.to_string(),
    version,
    timemodified: None,
    format,
  };
  let component = parse(&contents, &options)?;
  tracing::debug!(path = %path.display(), strings = component.len(), "parsed language file");
  Ok(component)
}

/// Render `component` as a modern-format language file. Keys are sorted and
/// deleted strings are left out.
pub fn export(component: &Component) -> String { serialize::export(component) }
