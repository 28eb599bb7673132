//! SQL migration definitions for the codedoc database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: codebases, elements, generation_cache, runs, FTS5",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS codebases (
    id         TEXT PRIMARY KEY,
    root       TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

-- One row per function or class found by the indexer
CREATE TABLE IF NOT EXISTS elements (
    id             TEXT PRIMARY KEY,
    codebase_id    TEXT NOT NULL REFERENCES codebases(id) ON DELETE CASCADE,
    kind           TEXT NOT NULL,
    name           TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    file_path      TEXT NOT NULL,
    line_start     INTEGER NOT NULL,
    signature      TEXT NOT NULL,
    docstring      TEXT,
    body_text      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_elements_codebase ON elements(codebase_id);

CREATE TABLE IF NOT EXISTS generation_cache (
    id          TEXT PRIMARY KEY,
    provider    TEXT NOT NULL,
    model_id    TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,
    result      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(provider, model_id, prompt_hash)
);

CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    codebase_id TEXT NOT NULL REFERENCES codebases(id) ON DELETE CASCADE,
    command     TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_codebase ON runs(codebase_id);

CREATE VIRTUAL TABLE IF NOT EXISTS elements_fts USING fts5(
    name,
    qualified_name,
    docstring,
    body_text,
    content=elements,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS elements_fts_insert AFTER INSERT ON elements BEGIN
    INSERT INTO elements_fts(rowid, name, qualified_name, docstring, body_text)
    VALUES (new.rowid, new.name, new.qualified_name, new.docstring, new.body_text);
END;

CREATE TRIGGER IF NOT EXISTS elements_fts_delete AFTER DELETE ON elements BEGIN
    INSERT INTO elements_fts(elements_fts, rowid, name, qualified_name, docstring, body_text)
    VALUES ('delete', old.rowid, old.name, old.qualified_name, old.docstring, old.body_text);
END;

CREATE TRIGGER IF NOT EXISTS elements_fts_update AFTER UPDATE ON elements BEGIN
    INSERT INTO elements_fts(elements_fts, rowid, name, qualified_name, docstring, body_text)
    VALUES ('delete', old.rowid, old.name, old.qualified_name, old.docstring, old.body_text);
    INSERT INTO elements_fts(rowid, name, qualified_name, docstring, body_text)
    VALUES (new.rowid, new.name, new.qualified_name, new.docstring, new.body_text);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
