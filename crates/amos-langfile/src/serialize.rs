//! Language-file writer.

use std::fmt::Write as _;

use amos_core::Component;

/// Escape `text` for a single-quoted PHP literal.
fn quote(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('\'');
  for c in text.chars() {
    if c == '\\' || c == '\'' {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('\'');
  out
}

pub(crate) fn export(component: &Component) -> String {
  let mut out = String::new();
  let _ = write!(
    out,
    "<?php\n\
     \n\
     /**\n \
     * Strings for component '{name}', language '{lang}', version '{version}'.\n \
     *\n \
     * @package    {name}\n \
     * @category   string\n \
     * @license    http://www.gnu.org/copyleft/gpl.html GNU GPL v3 or later\n \
     */\n\
     \n\
     defined('MOODLE_INTERNAL') || die();\n\
     \n",
    name = component.name(),
    lang = component.lang(),
    version = component.version(),
  );

  for value in component {
    let Some(text) = value.text() else { continue };
    let _ = writeln!(out, "$string[{}] = {};", quote(value.id()), quote(text));
  }
  out
}
