//! Error types for `amos-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("string `{id}` already exists in {component}")]
  DuplicateKey { component: String, id: String },

  #[error("invalid string identifier: {0:?}")]
  InvalidKeySyntax(String),

  #[error("invalid component name: {0:?}")]
  InvalidComponentName(String),

  #[error("invalid language code: {0:?}")]
  InvalidLanguage(String),

  #[error("unknown version: {0}")]
  UnknownVersion(String),

  #[error("unknown language: {0}")]
  UnknownLanguage(String),

  #[error("invalid version registry: {0}")]
  InvalidRegistry(String),

  /// The atomic commit failed and was rolled back. `units` names every
  /// `component/lang@version` that was part of it.
  #[error("commit of {units} failed: {source}")]
  CommitFailure {
    units:  String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Box a backend error. Used with `map_err` at every store call site.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
