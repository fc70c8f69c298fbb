use super::*;
use crate::{
  memory::MemoryStore,
  revision::{HistoryQuery, NewCommit, NewRevision, Revision, SnapshotQuery},
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn registry() -> VersionRegistry { VersionRegistry::moodle() }

fn version(code: u32) -> Version { registry().by_code(code).unwrap().clone() }

/// Commit one string revision exactly as given.
async fn put(store: &MemoryStore, lang: &str, since: u32, id: &str, text: Option<&str>, t: Timestamp) {
  let mut c = Component::new("moodle", lang, version(since)).unwrap();
  let value = match text {
    Some(text) => StringValue::new(id, text).unwrap(),
    None => StringValue::tombstone(id).unwrap(),
  };
  c.add_string(value.at(t), false).unwrap();
  let mut stage = Stage::new();
  stage.add(c, false).unwrap();
  stage
    .commit(
      store,
      CommitMeta::new("seed", CommitSource::Unittest, "tester"),
      CommitOptions { skip_rebase: true, timestamp: Some(t) },
    )
    .await
    .unwrap();
}

async fn text_at(store: &MemoryStore, lang: &str, code: u32, id: &str) -> Option<String> {
  let c = Component::load(store, "moodle", lang, &version(code), SnapshotOptions::default())
    .await
    .unwrap();
  c.get_string(id).and_then(StringValue::text).map(str::to_string)
}

async fn history(store: &MemoryStore, lang: &str, id: &str) -> Vec<Revision> {
  store
    .history(HistoryQuery {
      component: "moodle".into(),
      strname:   id.into(),
      lang:      Some(lang.into()),
    })
    .await
    .unwrap()
}

// ─── Planner ─────────────────────────────────────────────────────────────────

fn snapshot_with(code: u32, strings: &[(&str, &str)]) -> Component {
  let mut c = Component::new("moodle", "cs", version(code)).unwrap();
  for (id, text) in strings {
    c.add_string(StringValue::new(*id, *text).unwrap(), false).unwrap();
  }
  c
}

#[test]
fn plan_pins_newer_branches() {
  let versions: Vec<Version> = [20, 21, 22].into_iter().map(version).collect();
  let before = vec![
    snapshot_with(20, &[("a", "A")]),
    snapshot_with(21, &[("a", "A")]),
    snapshot_with(22, &[("a", "A2")]),
  ];
  let mut changes = Changes::new();
  changes.entry(20).or_default().insert("a".into(), Change::remove());

  let rows = plan(&versions, &before, &changes);
  assert_eq!(rows.get(&20).unwrap(), &vec![("a".to_string(), None)]);
  // 21 should keep "A", which the tombstone at 20 would otherwise hide.
  assert_eq!(rows.get(&21).unwrap(), &vec![("a".to_string(), Some("A".to_string()))]);
  // 22 is pinned by the row at 21 already showing a different value.
  assert_eq!(rows.get(&22).unwrap(), &vec![("a".to_string(), Some("A2".to_string()))]);
}

#[test]
fn plan_skips_changes_already_in_effect() {
  let versions: Vec<Version> = [20, 21].into_iter().map(version).collect();
  let before = vec![snapshot_with(20, &[("a", "A")]), snapshot_with(21, &[("a", "A")])];
  let mut changes = Changes::new();
  changes.entry(20).or_default().insert("a".into(), Change::set(" A "));
  changes.entry(21).or_default().insert("b".into(), Change::remove());
  assert!(plan(&versions, &before, &changes).is_empty());

  changes.entry(21).or_default().insert("a".into(), Change::restate("A"));
  let rows = plan(&versions, &before, &changes);
  assert_eq!(rows.keys().copied().collect::<Vec<_>>(), vec![21]);
}

// ─── Mark up to date ─────────────────────────────────────────────────────────

#[tokio::test]
async fn outdated_translation_marked_up_to_date() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "groupmode", Some("Group Mode"), 100).await;
  put(&store, "cs", 20, "groupmode", Some("Skupinový režim"), 110).await;
  put(&store, "en", 21, "groupmode", Some("Group mode"), 120).await;

  let registry = registry();
  let report = Policies::new(&store, &registry)
    .at(200)
    .mark_up_to_date("moodle", "cs", &version(21), &["groupmode".into()])
    .await
    .unwrap();
  assert!(report.is_clean());
  assert_eq!(report.commits.len(), 1);
  assert_eq!(report.commits[0].meta.source, CommitSource::UpToDate);

  let revs = history(&store, "cs", "groupmode").await;
  assert_eq!(revs.len(), 2);
  assert_eq!((revs[0].since, revs[0].timemodified), (20, 110));
  assert_eq!((revs[1].since, revs[1].timemodified), (21, 200));
  assert_eq!(revs[1].text.as_deref(), Some("Skupinový režim"));

  // The 2.0 branch still shows the original revision.
  let old = Component::load(
    &store,
    "moodle",
    "cs",
    &version(20),
    SnapshotOptions { as_of: Some(150), ..Default::default() },
  )
  .await
  .unwrap();
  assert_eq!(old.get_string("groupmode").unwrap().timemodified(), Some(110));
}

#[tokio::test]
async fn english_cannot_be_marked_up_to_date() {
  let store = MemoryStore::new();
  let registry = registry();
  let err = Policies::new(&store, &registry)
    .mark_up_to_date("moodle", "en", &version(21), &[])
    .await;
  assert!(matches!(err, Err(Error::InvalidLanguage(_))));
}

// ─── Backport and auto-merge ─────────────────────────────────────────────────

#[tokio::test]
async fn backport_stops_at_different_english() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "en", 22, "x", Some("Hello!"), 20).await;
  put(&store, "cs", 23, "x", Some("Ahoj!"), 30).await;

  let registry = registry();
  let report = Policies::new(&store, &registry)
    .at(100)
    .backport("moodle", &BackportOptions::default())
    .await
    .unwrap();
  assert!(report.is_clean());
  assert_eq!(report.commits.len(), 1);
  assert_eq!(report.commits[0].meta.source, CommitSource::Backport);

  assert_eq!(text_at(&store, "cs", 22, "x").await.as_deref(), Some("Ahoj!"));
  assert_eq!(text_at(&store, "cs", 21, "x").await, None);
  assert_eq!(text_at(&store, "cs", 20, "x").await, None);
}

#[tokio::test]
async fn backport_keeps_newer_branches() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "cs", 22, "x", Some("Ahoj"), 20).await;
  put(&store, "cs", 30, "x", Some("Nazdar"), 30).await;

  let registry = registry();
  Policies::new(&store, &registry)
    .at(100)
    .backport("moodle", &BackportOptions::default())
    .await
    .unwrap();

  assert_eq!(text_at(&store, "cs", 20, "x").await.as_deref(), Some("Ahoj"));
  assert_eq!(text_at(&store, "cs", 29, "x").await.as_deref(), Some("Ahoj"));
  assert_eq!(text_at(&store, "cs", 30, "x").await.as_deref(), Some("Nazdar"));
  assert_eq!(text_at(&store, "cs", 404, "x").await.as_deref(), Some("Nazdar"));

  // A second run has nothing left to do.
  let again = Policies::new(&store, &registry)
    .at(200)
    .backport("moodle", &BackportOptions::default())
    .await
    .unwrap();
  assert!(again.commits.is_empty());
}

#[tokio::test]
async fn backport_respects_filters() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "cs", 21, "x", Some("Ahoj"), 20).await;
  put(&store, "de", 21, "x", Some("Hallo"), 20).await;

  let registry = registry();
  let options = BackportOptions { languages: Some(vec!["de".into()]), versions: None };
  Policies::new(&store, &registry).at(100).backport("moodle", &options).await.unwrap();
  assert_eq!(text_at(&store, "de", 20, "x").await.as_deref(), Some("Hallo"));
  assert_eq!(text_at(&store, "cs", 20, "x").await, None);

  // Restricting to branches that do not include the source does nothing.
  let options = BackportOptions { languages: None, versions: Some(vec![20]) };
  let report = Policies::new(&store, &registry).at(110).backport("moodle", &options).await.unwrap();
  assert!(report.commits.is_empty());
}

#[tokio::test]
async fn en_fix_is_never_propagated() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "en_fix", 21, "x", Some("Hello there"), 20).await;

  let registry = registry();
  let policies = Policies::new(&store, &registry).at(100);
  assert!(policies.backport("moodle", &BackportOptions::default()).await.unwrap().commits.is_empty());
  assert!(policies.auto_merge("moodle").await.unwrap().commits.is_empty());
  assert_eq!(text_at(&store, "en_fix", 20, "x").await, None);
}

#[tokio::test]
async fn auto_merge_fills_deleted_newer_branch() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "cs", 20, "x", Some("Ahoj"), 20).await;
  // The translation was removed from 2.2 on, English stayed the same.
  put(&store, "cs", 22, "x", None, 30).await;

  let registry = registry();
  let report = Policies::new(&store, &registry).at(100).auto_merge("moodle").await.unwrap();
  assert!(report.is_clean());
  assert!(report.commits.iter().all(|c| c.meta.source == CommitSource::AutoMerge));

  assert_eq!(text_at(&store, "cs", 22, "x").await.as_deref(), Some("Ahoj"));
  assert_eq!(text_at(&store, "cs", 404, "x").await.as_deref(), Some("Ahoj"));
  // English never receives copies.
  assert_eq!(history(&store, "en", "x").await.len(), 1);
}

#[tokio::test]
async fn auto_merge_fills_older_branches() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  // Translated only from 3.0 on.
  put(&store, "cs", 30, "x", Some("Ahoj"), 20).await;

  let registry = registry();
  let report = Policies::new(&store, &registry).at(100).auto_merge("moodle").await.unwrap();
  assert!(report.is_clean());
  assert!(!report.commits.is_empty());
  assert!(report.commits.iter().all(|c| c.meta.source == CommitSource::AutoMerge));

  for code in [20, 25, 29, 30, 404] {
    assert_eq!(text_at(&store, "cs", code, "x").await.as_deref(), Some("Ahoj"), "{code}");
  }
  // The frozen 1.9 branch is never written.
  assert_eq!(text_at(&store, "cs", 19, "x").await, None);
  assert_eq!(history(&store, "en", "x").await.len(), 1);
}

#[tokio::test]
async fn auto_merge_stops_at_english_change() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "en", 22, "x", Some("Hello!"), 15).await;
  put(&store, "en", 30, "x", Some("Hi"), 16).await;
  put(&store, "cs", 22, "x", Some("Ahoj!"), 20).await;
  put(&store, "cs", 30, "x", None, 25).await;

  let registry = registry();
  let report = Policies::new(&store, &registry).at(100).auto_merge("moodle").await.unwrap();
  assert!(report.is_clean());
  assert!(report.commits.is_empty());

  // Older branches have a different English, newer ones too.
  assert_eq!(text_at(&store, "cs", 21, "x").await, None);
  assert_eq!(text_at(&store, "cs", 20, "x").await, None);
  assert_eq!(text_at(&store, "cs", 30, "x").await, None);
  assert_eq!(text_at(&store, "cs", 29, "x").await.as_deref(), Some("Ahoj!"));
}

// ─── Intersect and cleanup ───────────────────────────────────────────────────

#[tokio::test]
async fn intersect_drops_orphaned_translations() {
  let store = MemoryStore::new();
  for id in ["a", "b", "c"] {
    put(&store, "en", 20, id, Some("English"), 10).await;
  }
  for id in ["a", "b", "d"] {
    put(&store, "cs", 20, id, Some("Česky"), 20).await;
  }

  let registry = registry();
  let report = Policies::new(&store, &registry).at(100).intersect("moodle").await.unwrap();
  assert_eq!(report.commits.len(), 1);
  assert_eq!(report.commits[0].meta.source, CommitSource::Bot);

  let cs = Component::load(&store, "moodle", "cs", &version(20), SnapshotOptions::default())
    .await
    .unwrap();
  assert_eq!(cs.ids().collect::<Vec<_>>(), vec!["a", "b"]);
  let d = history(&store, "cs", "d").await;
  assert!(d.last().unwrap().deleted());
}

#[tokio::test]
async fn intersect_keeps_translation_where_english_returns() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "en", 22, "x", None, 20).await;
  put(&store, "en", 25, "x", Some("Hello"), 30).await;
  put(&store, "cs", 20, "x", Some("Ahoj"), 40).await;

  let registry = registry();
  Policies::new(&store, &registry).at(100).intersect("moodle").await.unwrap();
  assert_eq!(text_at(&store, "cs", 21, "x").await.as_deref(), Some("Ahoj"));
  assert_eq!(text_at(&store, "cs", 22, "x").await, None);
  assert_eq!(text_at(&store, "cs", 24, "x").await, None);
  assert_eq!(text_at(&store, "cs", 25, "x").await.as_deref(), Some("Ahoj"));
}

#[tokio::test]
async fn reverse_cleanup_is_idempotent() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "cs", 20, "x", Some("Ahoj"), 20).await;
  put(&store, "de", 20, "x", Some("Hallo"), 20).await;
  put(&store, "en", 20, "x", None, 30).await;

  let registry = registry();
  let first = Policies::new(&store, &registry).at(100).reverse_cleanup("moodle", None).await.unwrap();
  assert_eq!(first.commits.len(), 2);
  assert_eq!(text_at(&store, "cs", 20, "x").await, None);
  assert_eq!(text_at(&store, "de", 20, "x").await, None);

  let count = store.revision_count().await;
  let second = Policies::new(&store, &registry).at(200).reverse_cleanup("moodle", None).await.unwrap();
  assert!(second.commits.is_empty());
  assert_eq!(store.revision_count().await, count);
}

#[tokio::test]
async fn reverse_cleanup_only_considers_recent_deletions() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "x", Some("Hello"), 10).await;
  put(&store, "cs", 20, "x", Some("Ahoj"), 20).await;
  put(&store, "en", 20, "x", None, 30).await;

  let registry = registry();
  let report = Policies::new(&store, &registry).at(100).reverse_cleanup("moodle", Some(50)).await.unwrap();
  assert!(report.commits.is_empty());
  assert_eq!(text_at(&store, "cs", 20, "x").await.as_deref(), Some("Ahoj"));
}

#[tokio::test]
async fn en_fix_cleanup() {
  let store = MemoryStore::new();
  put(&store, "en", 20, "merged", Some("Fixed text"), 50).await;
  put(&store, "en", 20, "pending", Some("Old text"), 10).await;
  put(&store, "en", 20, "stale", Some("Newer text"), 60).await;
  put(&store, "en_fix", 20, "merged", Some("Fixed text"), 40).await;
  put(&store, "en_fix", 20, "pending", Some("New text"), 40).await;
  put(&store, "en_fix", 20, "stale", Some("Better text"), 40).await;
  put(&store, "en_fix", 20, "gone", Some("Whatever"), 40).await;

  let registry = registry();
  Policies::new(&store, &registry).at(100).cleanup_en_fix("moodle", false).await.unwrap();
  let fix = Component::load(&store, "moodle", "en_fix", &version(20), SnapshotOptions::default())
    .await
    .unwrap();
  assert_eq!(fix.ids().collect::<Vec<_>>(), vec!["pending", "stale"]);

  Policies::new(&store, &registry).at(200).cleanup_en_fix("moodle", true).await.unwrap();
  let fix = Component::load(&store, "moodle", "en_fix", &version(20), SnapshotOptions::default())
    .await
    .unwrap();
  assert_eq!(fix.ids().collect::<Vec<_>>(), vec!["pending"]);
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("read only")]
struct ReadOnly;

/// Reads from an inner memory store; every commit fails.
struct ReadOnlyStore(MemoryStore);

impl RevisionStore for ReadOnlyStore {
  type Error = ReadOnly;

  async fn commit(&self, _: NewCommit, _: Vec<NewRevision>) -> std::result::Result<Commit, ReadOnly> {
    Err(ReadOnly)
  }

  async fn snapshot(&self, q: SnapshotQuery) -> std::result::Result<Vec<Revision>, ReadOnly> {
    self.0.snapshot(q).await.map_err(|_| ReadOnly)
  }

  async fn history(&self, q: HistoryQuery) -> std::result::Result<Vec<Revision>, ReadOnly> {
    self.0.history(q).await.map_err(|_| ReadOnly)
  }

  async fn get_commit(&self, id: i64) -> std::result::Result<Option<Commit>, ReadOnly> {
    self.0.get_commit(id).await.map_err(|_| ReadOnly)
  }

  async fn list_components(&self) -> std::result::Result<Vec<String>, ReadOnly> {
    self.0.list_components().await.map_err(|_| ReadOnly)
  }

  async fn list_languages(&self) -> std::result::Result<Vec<String>, ReadOnly> {
    self.0.list_languages().await.map_err(|_| ReadOnly)
  }
}

#[tokio::test]
async fn failed_units_are_reported_not_raised() {
  let inner = MemoryStore::new();
  for id in ["a", "b"] {
    put(&inner, "en", 20, id, Some("English"), 10).await;
  }
  put(&inner, "cs", 20, "z", Some("Česky"), 20).await;
  put(&inner, "de", 20, "z", Some("Deutsch"), 20).await;

  let store = ReadOnlyStore(inner);
  let registry = registry();
  let report = Policies::new(&store, &registry).at(100).intersect("moodle").await.unwrap();
  assert!(report.commits.is_empty());
  // One failure per language; the second language was still attempted.
  let units: Vec<&str> = report.failures.iter().map(|f| f.unit.as_str()).collect();
  assert_eq!(units, vec!["moodle/cs@20", "moodle/de@20"]);
  assert!(matches!(report.failures[0].error, Error::CommitFailure { .. }));
}
