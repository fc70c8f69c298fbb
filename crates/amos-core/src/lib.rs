//! Core types and algorithms for the AMOS string repository.
//!
//! An append-only, multi-branch, multi-language revision store for
//! translatable strings. This crate holds the domain model (versions, string
//! values, components, stages), the [`store::RevisionStore`] abstraction, an
//! in-memory backend and the batch merge/propagation policies. It has no
//! database or file-format dependencies; those live in sibling crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod component;
pub mod error;
pub mod memory;
pub mod persistent;
pub mod policy;
pub mod revision;
pub mod stage;
pub mod store;
pub mod string;
pub mod text;
pub mod version;

pub use component::{Component, SnapshotOptions};
pub use error::{Error, Result};
pub use stage::{CommitOptions, CommitOutcome, RebaseOptions, Stage};
pub use string::StringValue;
pub use version::{StringFormat, Version, VersionRegistry};

/// Seconds since the Unix epoch. All revision timestamps use this unit.
pub type Timestamp = i64;

/// The language code of the English originals.
pub const ENGLISH: &str = "en";

/// Quarantine pseudo-language holding pending fixes of English strings.
pub const EN_FIX: &str = "en_fix";

/// The current time as a [`Timestamp`].
pub fn now() -> Timestamp { chrono::Utc::now().timestamp() }
