//! SQL schema for the natter SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Messages are append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY,   -- client-chosen identity
    author       TEXT NOT NULL,
    body         TEXT NOT NULL,
    confirmed_at INTEGER NOT NULL    -- ms since epoch; store-assigned, strictly increasing
);

CREATE INDEX IF NOT EXISTS messages_confirmed_idx ON messages(confirmed_at);

PRAGMA user_version = 1;
";
