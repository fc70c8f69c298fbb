//! Parser for the restricted PHP subset used by language files.
//!
//! Pipeline:
//!   raw &str
//!     └─ tokenize()          → Vec<Token>   (literals decoded, interpolation vetted)
//!          └─ Parser::file()  → Vec<Entry>  (key, text, line)
//!
//! Nothing is ever evaluated. The accepted statements are the open tag, the
//! `defined('MOODLE_INTERNAL') || die();` guard, `$string['key'] = '...';`
//! and `$string = array('key' => '...', ...);` (or `[...]`).

use crate::error::{Error, Result};

// ─── Tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
  OpenTag,
  CloseTag,
  /// `$name`, without the sigil.
  Var(String),
  Ident(String),
  /// A decoded string literal.
  Str(String),
  LBracket,
  RBracket,
  LParen,
  RParen,
  Assign,
  Arrow,
  Comma,
  Semi,
  Dot,
  Or,
  Other(char),
}

#[derive(Debug, Clone)]
struct Token {
  tok:  Tok,
  line: usize,
}

fn describe(tok: &Tok) -> String {
  match tok {
    Tok::OpenTag => "`<?php`".into(),
    Tok::CloseTag => "`?>`".into(),
    Tok::Var(name) => format!("`${name}`"),
    Tok::Ident(name) => format!("`{name}`"),
    Tok::Str(_) => "a string literal".into(),
    Tok::LBracket => "`[`".into(),
    Tok::RBracket => "`]`".into(),
    Tok::LParen => "`(`".into(),
    Tok::RParen => "`)`".into(),
    Tok::Assign => "`=`".into(),
    Tok::Arrow => "`=>`".into(),
    Tok::Comma => "`,`".into(),
    Tok::Semi => "`;`".into(),
    Tok::Dot => "`.`".into(),
    Tok::Or => "`||`".into(),
    Tok::Other(c) => format!("`{c}`"),
  }
}

fn parse_error(line: usize, message: impl Into<String>) -> Error {
  Error::Parse { line, message: message.into() }
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

struct Lexer {
  chars: Vec<char>,
  pos:   usize,
  line:  usize,
}

fn is_ident_start(c: char) -> bool { c.is_ascii_alphabetic() || c == '_' }

fn is_ident_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }

impl Lexer {
  fn new(src: &str) -> Self { Self { chars: src.chars().collect(), pos: 0, line: 1 } }

  fn peek(&self) -> Option<char> { self.chars.get(self.pos).copied() }

  fn peek_at(&self, offset: usize) -> Option<char> { self.chars.get(self.pos + offset).copied() }

  fn starts_with(&self, s: &str) -> bool {
    s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += 1;
    if c == '\n' {
      self.line += 1;
    }
    Some(c)
  }

  fn ident(&mut self) -> String {
    let mut out = String::new();
    while let Some(c) = self.peek().filter(|c| is_ident_char(*c)) {
      out.push(c);
      self.pos += 1;
    }
    out
  }

  /// Up to 24 characters starting at `pos`, for error messages.
  fn snippet(&self, from: usize) -> String {
    self.chars[from..].iter().take(24).take_while(|c| **c != '\n').collect()
  }

  fn tokens(mut self) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    loop {
      while self.peek().is_some_and(char::is_whitespace) {
        self.bump();
      }
      let line = self.line;
      let Some(c) = self.peek() else { break };

      let tok = if self.starts_with("<?php") {
        self.pos += 5;
        Tok::OpenTag
      } else if self.starts_with("?>") {
        self.pos += 2;
        Tok::CloseTag
      } else if self.starts_with("<<<") {
        return Err(parse_error(line, "heredoc and nowdoc strings are not supported"));
      } else if self.starts_with("//") || c == '#' {
        while self.peek().is_some_and(|c| c != '\n') {
          self.bump();
        }
        continue;
      } else if self.starts_with("/*") {
        self.pos += 2;
        while !self.starts_with("*/") {
          if self.bump().is_none() {
            return Err(parse_error(line, "unterminated comment"));
          }
        }
        self.pos += 2;
        continue;
      } else if c == '$' {
        self.pos += 1;
        let name = self.ident();
        if name.is_empty() {
          Tok::Other('$')
        } else {
          Tok::Var(name)
        }
      } else if is_ident_start(c) {
        Tok::Ident(self.ident())
      } else if c == '\'' {
        Tok::Str(self.single_quoted(line)?)
      } else if c == '"' {
        Tok::Str(self.double_quoted(line)?)
      } else if self.starts_with("=>") {
        self.pos += 2;
        Tok::Arrow
      } else if self.starts_with("||") {
        self.pos += 2;
        Tok::Or
      } else {
        self.pos += 1;
        match c {
          '[' => Tok::LBracket,
          ']' => Tok::RBracket,
          '(' => Tok::LParen,
          ')' => Tok::RParen,
          '=' => Tok::Assign,
          ',' => Tok::Comma,
          ';' => Tok::Semi,
          '.' => Tok::Dot,
          other => Tok::Other(other),
        }
      };
      out.push(Token { tok, line });
    }
    Ok(out)
  }

  // ── Literals ──────────────────────────────────────────────────────────

  /// `'...'`: only `\'` and `\\` are escapes.
  fn single_quoted(&mut self, line: usize) -> Result<String> {
    self.bump();
    let mut out = String::new();
    loop {
      match self.bump() {
        None => return Err(parse_error(line, "unterminated string literal")),
        Some('\'') => return Ok(out),
        Some('\\') => match self.peek() {
          Some(c @ ('\'' | '\\')) => {
            self.bump();
            out.push(c);
          }
          _ => out.push('\\'),
        },
        Some(c) => out.push(c),
      }
    }
  }

  /// `"..."`: the PHP escapes, and no interpolation except the `$a`
  /// placeholder forms, which are kept verbatim. Byte escapes must stay
  /// within ASCII.
  fn double_quoted(&mut self, line: usize) -> Result<String> {
    self.bump();
    let mut out = String::new();
    loop {
      let at = self.pos;
      match self.bump() {
        None => return Err(parse_error(line, "unterminated string literal")),
        Some('"') => return Ok(out),
        Some('\\') => match self.peek() {
          Some(c @ ('"' | '\\' | '$')) => {
            self.bump();
            out.push(c);
          }
          Some('n') => {
            self.bump();
            out.push('\n');
          }
          Some('t') => {
            self.bump();
            out.push('\t');
          }
          Some('r') => {
            self.bump();
            out.push('\r');
          }
          Some('e') => {
            self.bump();
            out.push('\u{1B}');
          }
          Some('v') => {
            self.bump();
            out.push('\u{0B}');
          }
          Some('f') => {
            self.bump();
            out.push('\u{0C}');
          }
          Some('x') if self.peek_at(1).is_some_and(|c| c.is_ascii_hexdigit()) => {
            self.bump();
            let value = self.digits(16, 2).unwrap_or_default();
            out.push(byte_escape(self.line, value)?);
          }
          Some('0'..='7') => {
            let value = self.digits(8, 3).unwrap_or_default();
            out.push(byte_escape(self.line, value)?);
          }
          Some('u') if self.peek_at(1) == Some('{') => {
            self.pos += 2;
            let c = self
              .digits(16, 6)
              .filter(|_| self.peek() == Some('}'))
              .and_then(char::from_u32)
              .ok_or_else(|| parse_error(self.line, "invalid `\\u{...}` escape"))?;
            self.bump();
            out.push(c);
          }
          _ => out.push('\\'),
        },
        Some('$') => {
          let placeholder = self.dollar_placeholder().ok_or_else(|| Error::Security {
            line:    self.line,
            snippet: self.snippet(at),
          })?;
          out.push('$');
          out.push_str(&placeholder);
        }
        Some('{') if self.peek() == Some('$') => {
          self.bump();
          let placeholder = self
            .dollar_placeholder()
            .filter(|p| !p.is_empty())
            .filter(|_| self.peek() == Some('}'))
            .ok_or_else(|| Error::Security { line: self.line, snippet: self.snippet(at) })?;
          self.bump();
          out.push_str("{$");
          out.push_str(&placeholder);
          out.push('}');
        }
        Some(c) => out.push(c),
      }
    }
  }

  /// Consume up to `max` digits in `radix`; `None` when there are none.
  fn digits(&mut self, radix: u32, max: usize) -> Option<u32> {
    let mut value = None;
    for _ in 0..max {
      let Some(d) = self.peek().and_then(|c| c.to_digit(radix)) else { break };
      self.pos += 1;
      value = Some(value.unwrap_or(0) * radix + d);
    }
    value
  }

  /// After an unescaped `$`: consume and return an allowed placeholder body
  /// (`a` or `a->prop`), the empty string for a lone dollar sign, or `None`
  /// for any other interpolation.
  fn dollar_placeholder(&mut self) -> Option<String> {
    match self.peek() {
      Some('{') => return None,
      Some(c) if is_ident_start(c) => {}
      _ => return Some(String::new()),
    }
    let name = self.ident();
    if name != "a" {
      return None;
    }
    if self.starts_with("->") && self.peek_at(2).is_some_and(is_ident_start) {
      self.pos += 2;
      let prop = self.ident();
      return Some(format!("a->{prop}"));
    }
    if self.peek() == Some('[') {
      return None;
    }
    Some(name)
  }
}

/// The character of a `\x..` or octal escape. Bytes above 0x7f would be
/// part of a multi-byte sequence and are rejected.
fn byte_escape(line: usize, value: u32) -> Result<char> {
  u8::try_from(value)
    .ok()
    .filter(u8::is_ascii)
    .map(char::from)
    .ok_or_else(|| parse_error(line, format!("byte escape {value:#x} is outside ASCII")))
}

fn tokenize(src: &str) -> Result<Vec<Token>> { Lexer::new(src).tokens() }

// ─── Parser ──────────────────────────────────────────────────────────────────

/// One `key => text` pair as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
  pub key:  String,
  pub text: String,
  pub line: usize,
}

struct Parser {
  tokens: Vec<Token>,
  pos:    usize,
  /// Line of the last token, reported for errors at end of input.
  last:   usize,
}

impl Parser {
  fn peek(&self) -> Option<&Tok> { self.tokens.get(self.pos).map(|t| &t.tok) }

  fn line(&self) -> usize { self.tokens.get(self.pos).map_or(self.last, |t| t.line) }

  fn next(&mut self) -> Option<Token> {
    let t = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    t
  }

  fn expect(&mut self, want: Tok) -> Result<()> {
    let line = self.line();
    match self.next() {
      Some(t) if t.tok == want => Ok(()),
      Some(t) if t.tok == Tok::Dot => Err(parse_error(t.line, "string concatenation is not allowed")),
      Some(t) => Err(parse_error(t.line, format!("expected {}, found {}", describe(&want), describe(&t.tok)))),
      None => Err(parse_error(line, format!("expected {}, found end of file", describe(&want)))),
    }
  }

  fn file(mut self) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    while let Some(token) = self.next() {
      match token.tok {
        // Text between `?>` and the next `<?php` must be whitespace; anything
        // else lexes into tokens that fail below.
        Tok::Semi | Tok::OpenTag | Tok::CloseTag => {}
        Tok::Ident(name) if name == "defined" => self.guard()?,
        Tok::Ident(name) if self.peek() == Some(&Tok::LParen) => {
          return Err(parse_error(token.line, format!("function calls are not allowed: `{name}(...)`")));
        }
        Tok::Var(name) if name == "string" => self.assignment(&mut entries)?,
        Tok::Var(name) => {
          return Err(Error::Security { line: token.line, snippet: format!("${name}") });
        }
        other => {
          return Err(parse_error(token.line, format!("unexpected {}", describe(&other))));
        }
      }
    }
    Ok(entries)
  }

  /// `defined('MOODLE_INTERNAL') || die();` after the `defined` identifier.
  fn guard(&mut self) -> Result<()> {
    self.expect(Tok::LParen)?;
    self.string()?;
    self.expect(Tok::RParen)?;
    self.expect(Tok::Or)?;
    let line = self.line();
    match self.next().map(|t| t.tok) {
      Some(Tok::Ident(name)) if name == "die" || name == "exit" => {}
      _ => return Err(parse_error(line, "expected `die` after the `defined(...) ||` guard")),
    }
    if self.peek() == Some(&Tok::LParen) {
      self.pos += 1;
      if matches!(self.peek(), Some(Tok::Str(_))) {
        self.pos += 1;
      }
      self.expect(Tok::RParen)?;
    }
    self.expect(Tok::Semi)
  }

  /// The statement after `$string`.
  fn assignment(&mut self, entries: &mut Vec<Entry>) -> Result<()> {
    let line = self.line();
    match self.next().map(|t| t.tok) {
      Some(Tok::LBracket) => {
        let key = self.string()?;
        self.expect(Tok::RBracket)?;
        self.expect(Tok::Assign)?;
        let text = self.literal()?;
        self.expect(Tok::Semi)?;
        entries.push(Entry { key, text, line });
        Ok(())
      }
      Some(Tok::Assign) => {
        let line = self.line();
        let close = match self.next().map(|t| t.tok) {
          Some(Tok::Ident(name)) if name.eq_ignore_ascii_case("array") => {
            self.expect(Tok::LParen)?;
            Tok::RParen
          }
          Some(Tok::LBracket) => Tok::RBracket,
          _ => return Err(parse_error(line, "expected an array literal")),
        };
        self.array(close, entries)?;
        self.expect(Tok::Semi)
      }
      Some(Tok::Dot) => Err(parse_error(line, "string concatenation is not allowed")),
      Some(other) => Err(parse_error(line, format!("unexpected {} after `$string`", describe(&other)))),
      None => Err(parse_error(line, "unexpected end of file after `$string`")),
    }
  }

  /// `'key' => 'text', ...` up to and including `close`.
  fn array(&mut self, close: Tok, entries: &mut Vec<Entry>) -> Result<()> {
    loop {
      if self.peek() == Some(&close) {
        self.pos += 1;
        return Ok(());
      }
      let line = self.line();
      let key = self.string()?;
      self.expect(Tok::Arrow)?;
      let text = self.literal()?;
      entries.push(Entry { key, text, line });

      match self.peek().cloned() {
        Some(Tok::Comma) => self.pos += 1,
        Some(t) if t == close => {}
        found => {
          let found = found.map_or("end of file".to_string(), |t| describe(&t));
          return Err(parse_error(self.line(), format!("expected `,` or {}, found {found}", describe(&close))));
        }
      }
    }
  }

  /// A string literal used as a key or guard argument.
  fn string(&mut self) -> Result<String> {
    let line = self.line();
    match self.next().map(|t| t.tok) {
      Some(Tok::Str(s)) => Ok(s),
      Some(Tok::Var(name)) => Err(Error::Security { line, snippet: format!("${name}") }),
      Some(other) => Err(parse_error(line, format!("expected a string literal, found {}", describe(&other)))),
      None => Err(parse_error(line, "expected a string literal, found end of file")),
    }
  }

  /// A string value; rejects anything that would need evaluating.
  fn literal(&mut self) -> Result<String> {
    let line = self.line();
    if let Some(Tok::Ident(name)) = self.peek() {
      let name = name.clone();
      self.pos += 1;
      return Err(if self.peek() == Some(&Tok::LParen) {
        parse_error(line, format!("function calls are not allowed: `{name}(...)`"))
      } else {
        parse_error(line, format!("expected a string literal, found `{name}`"))
      });
    }
    let value = self.string()?;
    if self.peek() == Some(&Tok::Dot) {
      return Err(parse_error(self.line(), "string concatenation is not allowed"));
    }
    Ok(value)
  }
}

/// Extract every `key => text` entry of a language file, in file order.
pub(crate) fn entries(src: &str) -> Result<Vec<Entry>> {
  let tokens = tokenize(src)?;
  let last = tokens.last().map_or(1, |t| t.line);
  Parser { tokens, pos: 0, last }.file()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn texts(src: &str) -> Vec<(String, String)> {
    entries(src).unwrap().into_iter().map(|e| (e.key, e.text)).collect()
  }

  fn pair(k: &str, v: &str) -> (String, String) { (k.to_string(), v.to_string()) }

  #[test]
  fn statement_form() {
    let src = "<?php\n\
      // This file is part of Moodle\n\
      /**\n * Strings.\n */\n\
      defined('MOODLE_INTERNAL') || die();\n\
      $string['pluginname'] = 'Forum';\n\
      # hash comment\n\
      $string['hello'] = \"Hello,\\n{$a}!\";\n";
    assert_eq!(texts(src), vec![pair("pluginname", "Forum"), pair("hello", "Hello,\n{$a}!")]);
  }

  #[test]
  fn array_forms() {
    let src = "<?php $string = array('a' => 'A', \"b\" => 'B',);";
    assert_eq!(texts(src), vec![pair("a", "A"), pair("b", "B")]);
    let src = "<?php $string = ['a' => 'A'];";
    assert_eq!(texts(src), vec![pair("a", "A")]);
    assert!(texts("<?php $string = [];").is_empty());
  }

  #[test]
  fn single_quote_escapes() {
    let src = r"<?php $string['a'] = 'It\'s a \\ and \n and \$a';";
    assert_eq!(texts(src), vec![pair("a", r"It's a \ and \n and \$a")]);
  }

  #[test]
  fn double_quote_escapes() {
    let src = r#"<?php $string['a'] = "Say \"hi\"\tto \$5 \\ now";"#;
    assert_eq!(texts(src), vec![pair("a", "Say \"hi\"\tto $5 \\ now")]);
  }

  #[test]
  fn numeric_and_control_escapes() {
    let src = r#"<?php $string['a'] = "A\x42\u{43}\104\e\v\f \xZ \u00";"#;
    assert_eq!(texts(src), vec![pair("a", "ABCD\u{1B}\u{0B}\u{0C} \\xZ \\u00")]);

    for src in [
      r#"<?php $string['a'] = "\xff";"#,
      r#"<?php $string['a'] = "\377";"#,
      r#"<?php $string['a'] = "\u{110000}";"#,
      r#"<?php $string['a'] = "\u{41";"#,
    ] {
      assert!(matches!(entries(src), Err(Error::Parse { .. })), "{src}");
    }
  }

  #[test]
  fn content_after_close_tag_is_parsed() {
    let src = "<?php $string['a'] = 'A'; ?>\n<?php $string['b'] = 'B';";
    assert_eq!(texts(src), vec![pair("a", "A"), pair("b", "B")]);

    let src = "<?php $string['a'] = 'A'; ?>\n<?php $CFG->x = 1;";
    assert!(matches!(entries(src), Err(Error::Security { line: 2, .. })));

    let src = "<?php $string['a'] = 'A'; ?>\ntrailing output";
    assert!(matches!(entries(src), Err(Error::Parse { line: 2, .. })));

    assert_eq!(texts("<?php $string['a'] = 'A'; ?>\n"), vec![pair("a", "A")]);
  }

  #[test]
  fn placeholders_kept_verbatim() {
    let src = r#"<?php $string['a'] = "$a and $a->name and {$a} and {$a->count} cost $ 5";"#;
    assert_eq!(texts(src), vec![pair("a", "$a and $a->name and {$a} and {$a->count} cost $ 5")]);
  }

  #[test]
  fn interpolation_rejected() {
    for src in [
      r#"<?php $string['a'] = "Hi $CFG->wwwroot";"#,
      r#"<?php $string['a'] = "Hi {$CFG}";"#,
      r#"<?php $string['a'] = "Hi ${a}";"#,
      r#"<?php $string['a'] = "Hi $a[0]";"#,
      r#"<?php $string['a'] = "Hi {$a->b->c}";"#,
    ] {
      assert!(matches!(entries(src), Err(Error::Security { .. })), "{src}");
    }
  }

  #[test]
  fn foreign_variables_rejected() {
    let err = entries("<?php\n$CFG->x = 1;").unwrap_err();
    match err {
      Error::Security { line, snippet } => {
        assert_eq!(line, 2);
        assert_eq!(snippet, "$CFG");
      }
      other => panic!("unexpected error: {other}"),
    }
    let err = entries("<?php $string['a'] = $other;").unwrap_err();
    assert!(matches!(err, Error::Security { .. }));
  }

  #[test]
  fn unsupported_syntax_is_parse_error() {
    for (src, needle) in [
      ("<?php $string['a'] = 'A' . 'B';", "concatenation"),
      ("<?php $string['a'] .= 'B';", "concatenation"),
      ("<?php $string['a'] = get_string('b');", "function calls"),
      ("<?php require_once('x.php');", "function calls"),
      ("<?php $string['a'] = <<<EOT\nx\nEOT;", "heredoc"),
      ("<?php $string['a'] = 'A;", "unterminated"),
      ("<?php /* never closed", "unterminated"),
      ("<?php echo 'x';", "unexpected"),
      ("<?php $string['a'] = 'A'", "end of file"),
      ("<?php $string['a'] = FOO;", "string literal"),
    ] {
      match entries(src) {
        Err(Error::Parse { message, .. }) => assert!(message.contains(needle), "{src}: {message}"),
        other => panic!("{src}: expected parse error, got {other:?}"),
      }
    }
  }

  #[test]
  fn error_lines() {
    let src = "<?php\n\n$string['a'] = 'A';\n$string['b'] = 'B' . 'C';\n";
    assert!(matches!(entries(src), Err(Error::Parse { line: 4, .. })));
    let src = "<?php\n$string['a'] = 'multi\nline\n";
    assert!(matches!(entries(src), Err(Error::Parse { line: 2, .. })));
  }
}
