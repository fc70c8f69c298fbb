//! `amos`: operator tool for the AMOS string repository.
//!
//! # Usage
//!
//! ```text
//! amos import lang/cs/moodle.php --lang cs --version 3.11
//! amos snapshot moodle --lang cs --version 4.1 --json
//! amos history moodle groupmode --lang cs
//! amos automerge moodle
//! amos uptodate moodle --lang cs --version 4.1
//! ```
//!
//! Settings come from `amos.toml` (or `--config`) and `AMOS_*` variables.

mod settings;

use std::path::PathBuf;

use amos_core::{
  CommitOptions, Component, RebaseOptions, SnapshotOptions, Stage, StringFormat, Timestamp,
  Version, VersionRegistry,
  policy::{BackportOptions, Policies, PolicyReport},
  revision::{CommitMeta, CommitSource, HistoryQuery},
  store::RevisionStore,
};
use amos_store_sqlite::SqliteStore;
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use settings::AppConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "amos", about = "AMOS string repository tool")]
struct Args {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "amos.toml")]
  config: PathBuf,

  /// Print machine-readable JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Commit the strings of a language file.
  Import {
    file:     PathBuf,
    #[arg(long)]
    lang:     String,
    /// Branch label, code, directory or git branch name.
    #[arg(long)]
    version:  String,
    /// The file uses legacy (pre-2.0) placeholder syntax.
    #[arg(long)]
    legacy:   bool,
    /// Treat the file as the complete component: strings it lacks are deleted.
    #[arg(long)]
    complete: bool,
    #[arg(short, long, default_value = "Import strings")]
    message:  String,
    #[arg(long, default_value = "AMOS importer <amos@moodle.org>", env = "AMOS_USER")]
    user:     String,
  },
  /// Show a component as it looks on one branch.
  Snapshot {
    component:  String,
    #[arg(long)]
    lang:       String,
    #[arg(long)]
    version:    String,
    /// Reference time, in seconds since the epoch.
    #[arg(long)]
    as_of:      Option<Timestamp>,
    /// Include deleted strings and their last text.
    #[arg(long)]
    tombstones: bool,
  },
  /// Every revision of one string.
  History {
    component: String,
    strname:   String,
    #[arg(long)]
    lang:      Option<String>,
  },
  /// Write a component as a language file.
  Export {
    component: String,
    #[arg(long)]
    lang:      String,
    #[arg(long)]
    version:   String,
    /// Output file; standard output when omitted.
    #[arg(short, long)]
    output:    Option<PathBuf>,
  },
  /// List components with at least one revision.
  Components,
  /// List languages with at least one revision.
  Languages,
  /// List the configured branches.
  Versions,
  /// Copy translations between branches whose English is identical.
  Automerge { component: String },
  /// Copy translations from newer branches to older ones.
  Backport {
    component: String,
    #[arg(long = "lang")]
    languages: Vec<String>,
    #[arg(long = "version")]
    versions:  Vec<String>,
  },
  /// Remove translations of strings English does not have.
  Intersect { component: String },
  /// Delete translations of strings deleted in English.
  Cleanup {
    component: String,
    /// Only English deletions at or after this time.
    #[arg(long)]
    since:     Option<Timestamp>,
  },
  /// Drop en_fix entries that English has caught up with.
  EnFixCleanup {
    component:  String,
    /// Also drop entries older than their English original.
    #[arg(long)]
    aggressive: bool,
  },
  /// Re-confirm translations as current for a branch.
  Uptodate {
    component: String,
    #[arg(long)]
    lang:      String,
    #[arg(long)]
    version:   String,
    /// Limit to these string ids.
    ids:       Vec<String>,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();
  let cfg = AppConfig::load(&args.config)?;
  let registry = cfg.registry()?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  run(args.command, args.json, &store, &registry).await
}

async fn run(command: Command, json: bool, store: &SqliteStore, registry: &VersionRegistry) -> Result<()> {
  let policies = Policies::new(store, registry);
  match command {
    Command::Import { file, lang, version, legacy, complete, message, user } => {
      let version = resolve(registry, &version)?;
      let format = if legacy { StringFormat::Legacy } else { StringFormat::Modern };
      let component = amos_langfile::parse_file(&file, &lang, version, format)
        .with_context(|| format!("failed to import {}", file.display()))?;
      let label = component.key().to_string();

      let mut stage = Stage::new();
      stage.add(component, false)?;
      if complete {
        stage
          .rebase(store, RebaseOptions { as_of: None, complete_snapshot: true })
          .await?;
      }
      let meta = CommitMeta::new(message, CommitSource::Import, user);
      let outcome = stage.commit(store, meta, CommitOptions::default()).await?;
      match outcome.commit() {
        Some(commit) => {
          tracing::info!(commit = commit.id, component = %label, "imported");
          print(json, commit, || format!("committed {} ({label})", commit.id))
        }
        None => print(json, &serde_json::Value::Null, || format!("nothing to commit ({label})")),
      }
    }

    Command::Snapshot { component, lang, version, as_of, tombstones } => {
      let version = resolve(registry, &version)?;
      let options = SnapshotOptions {
        as_of,
        include_tombstones: tombstones,
        include_history_of_deleted: tombstones,
      };
      let c = Component::from_snapshot(store, &component, &lang, &version, options).await?;
      let strings: Vec<_> = c.iter().collect();
      print(json, &strings, || {
        strings
          .iter()
          .map(|s| match s.text() {
            Some(text) => format!("{}\t{}", s.id(), text.replace('\n', "\\n")),
            None => format!("{}\t<deleted; was {:?}>", s.id(), s.last_text().unwrap_or_default()),
          })
          .collect::<Vec<_>>()
          .join("\n")
      })
    }

    Command::History { component, strname, lang } => {
      let revisions = store
        .history(HistoryQuery { component, strname, lang })
        .await
        .context("failed to read history")?;
      print(json, &revisions, || {
        revisions
          .iter()
          .map(|r| {
            format!(
              "{}\t{}\t{}\tcommit {}\t{}",
              r.timemodified,
              r.lang,
              r.since,
              r.commit_id,
              r.text.as_deref().unwrap_or("<deleted>"),
            )
          })
          .collect::<Vec<_>>()
          .join("\n")
      })
    }

    Command::Export { component, lang, version, output } => {
      let version = resolve(registry, &version)?;
      let c =
        Component::from_snapshot(store, &component, &lang, &version, SnapshotOptions::default()).await?;
      let php = amos_langfile::export(&c);
      match output {
        Some(path) => std::fs::write(&path, php)
          .with_context(|| format!("failed to write {}", path.display())),
        None => {
          print!("{php}");
          Ok(())
        }
      }
    }

    Command::Components => {
      let names = store.list_components().await?;
      print(json, &names, || names.join("\n"))
    }

    Command::Languages => {
      let langs = store.list_languages().await?;
      print(json, &langs, || langs.join("\n"))
    }

    Command::Versions => {
      let all = registry.list_all();
      print(json, &all, || {
        all
          .iter()
          .map(|v| {
            let frozen = if v.translatable { "" } else { "\tfrozen" };
            format!("{}\t{}\t{}{frozen}", v.code, v.label, v.branch)
          })
          .collect::<Vec<_>>()
          .join("\n")
      })
    }

    Command::Automerge { component } => report(json, policies.auto_merge(&component).await?),

    Command::Backport { component, languages, versions } => {
      let versions = versions
        .iter()
        .map(|v| resolve(registry, v).map(|v| v.code))
        .collect::<Result<Vec<_>>>()?;
      let options = BackportOptions {
        languages: (!languages.is_empty()).then_some(languages),
        versions:  (!versions.is_empty()).then_some(versions),
      };
      report(json, policies.backport(&component, &options).await?)
    }

    Command::Intersect { component } => report(json, policies.intersect(&component).await?),

    Command::Cleanup { component, since } => {
      report(json, policies.reverse_cleanup(&component, since).await?)
    }

    Command::EnFixCleanup { component, aggressive } => {
      report(json, policies.cleanup_en_fix(&component, aggressive).await?)
    }

    Command::Uptodate { component, lang, version, ids } => {
      let version = resolve(registry, &version)?;
      report(json, policies.mark_up_to_date(&component, &lang, &version, &ids).await?)
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn resolve(registry: &VersionRegistry, reference: &str) -> Result<Version> {
  Ok(registry.resolve(reference)?.clone())
}

/// Print `value` as JSON, or the text rendering otherwise.
fn print<T: serde::Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(value)?);
  } else {
    let text = text();
    if !text.is_empty() {
      println!("{text}");
    }
  }
  Ok(())
}

/// Print a policy report. Failed units make the command fail after the
/// successful commits have been listed.
fn report(json: bool, report: PolicyReport) -> Result<()> {
  let ids: Vec<i64> = report.commits.iter().map(|c| c.id).collect();
  let failures: Vec<serde_json::Value> = report
    .failures
    .iter()
    .map(|f| serde_json::json!({ "unit": f.unit, "error": f.error.to_string() }))
    .collect();
  print(json, &serde_json::json!({ "commits": ids, "failures": failures }), || {
    format!("{} commit(s), {} failed unit(s)", ids.len(), failures.len())
  })?;

  if !report.is_clean() {
    for f in &report.failures {
      tracing::error!(unit = %f.unit, error = %f.error, "unit failed");
    }
    anyhow::bail!("{} unit(s) failed", report.failures.len());
  }
  Ok(())
}
