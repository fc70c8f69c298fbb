//! Canonicalization of string texts.
//!
//! [`fix_syntax`] normalizes line endings, strips invisible control
//! characters and surplus whitespace, and converts placeholder syntax between
//! the legacy and modern formats. It is pure, and idempotent whenever source
//! and target formats are equal.

use std::sync::LazyLock;

use regex::Regex;

use crate::version::StringFormat;

static TRAILING_WS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));

/// Two or more blank lines in a row.
static BLANK_RUN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static DOUBLE_PERCENT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"%%").expect("valid regex"));

static WRAPPED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\{(\$a(?:->[a-zA-Z0-9_]+)?)\}").expect("valid regex")
});

/// Characters turned into a line feed: VT, FF, CR, ETB, EM, SUB, BPH, NEL,
/// SOS, ST, LINE SEPARATOR, PARAGRAPH SEPARATOR.
fn is_line_break(c: char) -> bool {
  matches!(
    c,
    '\u{0B}'..='\r'
      | '\u{17}'
      | '\u{19}'
      | '\u{1A}'
      | '\u{82}'
      | '\u{85}'
      | '\u{98}'
      | '\u{9C}'
      | '\u{2028}'
      | '\u{2029}'
  )
}

/// Characters dropped entirely: remaining C0/C1 controls that carry no
/// meaning in a UI string, ZERO WIDTH SPACE and BYTE ORDER MARK.
fn is_removed(c: char) -> bool {
  matches!(
    c,
    '\0'
      | '\u{05}'..='\u{07}'
      | '\u{0E}'..='\u{16}'
      | '\u{1B}'
      | '\u{7F}'
      | '\u{80}'
      | '\u{81}'
      | '\u{83}'
      | '\u{84}'
      | '\u{86}'..='\u{93}'
      | '\u{95}'..='\u{97}'
      | '\u{99}'
      | '\u{9D}'..='\u{9F}'
      | '\u{200B}'
      | '\u{FEFF}'
  )
}

fn is_word(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }

/// Length in chars of the placeholder (`$a` or `$a->word`) starting at `i`,
/// if there is one. `$a_like_identifier` is not a placeholder.
fn placeholder_len(chars: &[char], i: usize) -> Option<usize> {
  if chars.get(i) != Some(&'$') || chars.get(i + 1) != Some(&'a') {
    return None;
  }
  if chars.get(i + 2) == Some(&'-')
    && chars.get(i + 3) == Some(&'>')
    && chars.get(i + 4).is_some_and(|c| is_word(*c))
  {
    let word = chars[i + 4..].iter().take_while(|c| is_word(**c)).count();
    return Some(4 + word);
  }
  match chars.get(i + 2) {
    Some(c) if is_word(*c) => None,
    _ => Some(2),
  }
}

/// Format-independent clean-up.
fn common(text: &str, format: StringFormat) -> String {
  let unified = text.replace("\r\n", "\n");
  let mapped: String = unified
    .chars()
    .filter(|c| !is_removed(*c))
    .map(|c| if is_line_break(c) { '\n' } else { c })
    .collect();

  let stripped = TRAILING_WS.replace_all(&mapped, "\n");
  let keep = format.max_blank_lines() + 1;
  let collapsed = BLANK_RUN.replace_all(&stripped, |caps: &regex::Captures<'_>| {
    "\n".repeat(caps[0].len().min(keep))
  });
  collapsed
    .trim_matches(|c| c == ' ' || c == '\t' || c == '\n')
    .to_string()
}

/// Escape every `$` that is neither escaped already nor a placeholder.
fn escape_dollars(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  for (i, &c) in chars.iter().enumerate() {
    if c == '$'
      && (i == 0 || chars[i - 1] != '\\')
      && placeholder_len(&chars, i).is_none()
    {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

/// Legacy text into modern syntax: drop escapes, wrap placeholders,
/// un-double percent signs.
fn legacy_to_modern(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut i = 0;
  while i < chars.len() {
    let c = chars[i];
    match (c, chars.get(i + 1)) {
      ('\\', Some(&next)) if matches!(next, '$' | '\'' | '"') => {
        out.push(next);
        i += 2;
      }
      ('$', _) => match placeholder_len(&chars, i) {
        Some(len) => {
          out.push('{');
          out.extend(&chars[i..i + len]);
          out.push('}');
          i += len;
        }
        None => {
          out.push('$');
          i += 1;
        }
      },
      _ => {
        out.push(c);
        i += 1;
      }
    }
  }
  DOUBLE_PERCENT.replace_all(&out, "%").into_owned()
}

/// Modern text into legacy syntax.
fn modern_to_legacy(text: &str) -> String {
  let unwrapped = WRAPPED_PLACEHOLDER.replace_all(text, "$1");
  let doubled = unwrapped.replace('%', "%%");
  escape_dollars(&doubled)
}

/// Canonicalize `text` written in `source` format for storage in `target`
/// format.
pub fn fix_syntax(text: &str, target: StringFormat, source: StringFormat) -> String {
  let clean = common(text, target);
  match (source, target) {
    (StringFormat::Modern, StringFormat::Modern) => clean,
    (StringFormat::Legacy, StringFormat::Legacy) => escape_dollars(&clean),
    (StringFormat::Legacy, StringFormat::Modern) => legacy_to_modern(&clean),
    (StringFormat::Modern, StringFormat::Legacy) => modern_to_legacy(&clean),
  }
}

/// Canonicalize `text` in place within a single format.
pub fn clean_text(text: &str, format: StringFormat) -> String {
  fix_syntax(text, format, format)
}


#[cfg(test)]
mod proptest_tests {
  use proptest::prelude::*;

  use super::*;

  proptest! {
    /// Property: normalization within one format is idempotent.
    #[test]
    fn modern_clean_is_idempotent(input in any::<String>()) {
      let once = clean_text(&input, StringFormat::Modern);
      prop_assert_eq!(clean_text(&once, StringFormat::Modern), once);
    }

    #[test]
    fn legacy_clean_is_idempotent(input in any::<String>()) {
      let once = clean_text(&input, StringFormat::Legacy);
      prop_assert_eq!(clean_text(&once, StringFormat::Legacy), once);
    }

    /// Property: the output never has surrounding whitespace or CR.
    #[test]
    fn output_is_trimmed(input in "[ \t\r\na-z$%{}\u{2028}]*") {
      let out = clean_text(&input, StringFormat::Modern);
      prop_assert!(!out.contains('\r'));
      prop_assert_eq!(out.trim_matches(|c| c == ' ' || c == '\n' || c == '\t'), out.as_str());
    }
  }
}
