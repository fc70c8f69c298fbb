//! Runtime configuration, layered from `amos.toml` and `AMOS_*` variables.

use std::path::{Path, PathBuf};

use amos_core::{VersionRegistry, version::VersionConfig};
use anyhow::Context as _;
use serde::Deserialize;

/// Settings shared by every subcommand.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  /// Branch list. The built-in Moodle list is used when absent.
  #[serde(default)]
  pub versions:   Option<Vec<VersionConfig>>,
}

fn default_store_path() -> PathBuf { PathBuf::from("amos.db") }

impl AppConfig {
  /// Read `path` if it exists, then overlay `AMOS_*` environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("AMOS"))
      .build()
      .context("failed to read config file")?;
    let mut cfg: AppConfig = settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn registry(&self) -> anyhow::Result<VersionRegistry> {
    match &self.versions {
      Some(entries) => {
        VersionRegistry::from_config(entries).context("invalid `versions` configuration")
      }
      None => Ok(VersionRegistry::moodle()),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
