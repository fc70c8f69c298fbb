//! SQL schema for the AMOS SQLite store.
//!
//! Executed once at connection startup. Later migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS commits (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    source         TEXT    NOT NULL,   -- CommitSource, lowercase
    message        TEXT    NOT NULL,
    user_id        INTEGER,
    user_info      TEXT    NOT NULL,
    commit_hash    TEXT,
    time_committed INTEGER NOT NULL    -- seconds since the epoch
);

-- Strictly append-only: no UPDATE or DELETE is ever issued against this
-- table. English originals and translations share it, told apart by lang.
CREATE TABLE IF NOT EXISTS revisions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    commit_id    INTEGER NOT NULL REFERENCES commits(id),
    component    TEXT    NOT NULL,
    lang         TEXT    NOT NULL,
    strname      TEXT    NOT NULL,
    text         TEXT,               -- NULL records a deletion
    since        INTEGER NOT NULL,   -- first version code the value applies to
    timemodified INTEGER NOT NULL,
    UNIQUE (commit_id, component, lang, since, strname)
);

CREATE INDEX IF NOT EXISTS revisions_snapshot_idx
    ON revisions(component, lang, since, timemodified);
CREATE INDEX IF NOT EXISTS revisions_history_idx
    ON revisions(component, strname, lang);
CREATE INDEX IF NOT EXISTS revisions_lang_idx
    ON revisions(lang);

-- Serialized persistent stages, one per user session.
CREATE TABLE IF NOT EXISTS stages (
    user_id    INTEGER NOT NULL,
    token      TEXT    NOT NULL,
    payload    TEXT    NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, token)
);

PRAGMA user_version = 1;
";
