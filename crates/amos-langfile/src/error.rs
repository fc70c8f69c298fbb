//! Error types for the language-file codec.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The file uses syntax outside the accepted subset.
  #[error("line {line}: {message}")]
  Parse { line: usize, message: String },

  /// The file tries to read a variable or interpolate one into a string.
  #[error("line {line}: refusing to evaluate `{snippet}`")]
  Security { line: usize, snippet: String },

  #[error("cannot derive a component name from {0}")]
  FileName(PathBuf),

  #[error(transparent)]
  Core(#[from] amos_core::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
