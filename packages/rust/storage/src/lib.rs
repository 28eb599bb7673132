//! libSQL storage layer (embedded, offline).
//!
//! The [`Storage`] struct wraps a local libSQL database holding the element
//! index used for retrieval (FTS5), the generation cache, and run history.
//!
//! **Access rules:**
//! - `generate` and `cache clear` open read-write via [`Storage::open`]
//! - `runs` opens an existing database read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::{Path, PathBuf};

use chrono::Utc;
use codedoc_shared::{CodeDocError, CodeElement, ElementKind, Result};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Directory under the output dir that holds the database.
pub const STATE_DIR: &str = ".codedoc";

/// Database file name inside [`STATE_DIR`].
pub const DB_FILE: &str = "codedoc.db";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> CodeDocError {
    CodeDocError::Storage(e.to_string())
}

impl Storage {
    /// Database location for a given output directory.
    pub fn default_path(output_dir: &Path) -> PathBuf {
        output_dir.join(STATE_DIR).join(DB_FILE)
    }

    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CodeDocError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CodeDocError::validation(format!(
                "no codedoc database at {}; run `codedoc generate` first",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CodeDocError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CodeDocError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Codebases
    // -----------------------------------------------------------------------

    /// Register (or refresh) a codebase root. The id is stable for a root.
    pub async fn upsert_codebase(&self, root: &Path) -> Result<String> {
        self.check_writable()?;
        let root_str = canonical_root(root);
        let id = codebase_id(&root_str);
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO codebases (id, root, indexed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET indexed_at = excluded.indexed_at",
                params![id.as_str(), root_str.as_str(), now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Element index
    // -----------------------------------------------------------------------

    /// Replace the indexed elements of a codebase in one transaction.
    pub async fn index_elements(&self, codebase_id: &str, elements: &[CodeElement]) -> Result<usize> {
        self.check_writable()?;
        if elements.is_empty() {
            return Err(CodeDocError::validation("no elements to index"));
        }

        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute(
            "DELETE FROM elements WHERE codebase_id = ?1",
            params![codebase_id],
        )
        .await
        .map_err(db_err)?;

        for el in elements {
            let id = Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO elements (id, codebase_id, kind, name, qualified_name, file_path,
                                       line_start, signature, docstring, body_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    codebase_id,
                    el.kind.as_str(),
                    el.name.as_str(),
                    el.qualified_name(),
                    el.file_path.as_str(),
                    el.line_start as i64,
                    el.signature.as_str(),
                    el.docstring.as_deref(),
                    body_text(el),
                ],
            )
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        tracing::debug!(codebase_id, elements = elements.len(), "indexed elements");
        Ok(elements.len())
    }

    /// Number of elements indexed for a codebase.
    pub async fn count_elements(&self, codebase_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM elements WHERE codebase_id = ?1",
                params![codebase_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }

    /// Lexical lookup of elements related to `query`, best first.
    ///
    /// The query is broken into identifier words and OR-ed together, so
    /// `"function parse_file"` matches anything mentioning `parse` or `file`.
    pub async fn search_similar(
        &self,
        codebase_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarElement>> {
        self.search(codebase_id, query, k, false).await
    }

    /// Like [`Storage::search_similar`] but only elements with a non-blank
    /// docstring count toward `k`.
    pub async fn search_documented(
        &self,
        codebase_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarElement>> {
        self.search(codebase_id, query, k, true).await
    }

    async fn search(
        &self,
        codebase_id: &str,
        query: &str,
        k: usize,
        documented_only: bool,
    ) -> Result<Vec<SimilarElement>> {
        let terms = identifier_words(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let match_expr = terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR ");

        let documented_filter = if documented_only {
            " AND e.docstring IS NOT NULL AND TRIM(e.docstring) != ''"
        } else {
            ""
        };
        let sql = format!(
            "SELECT e.kind, e.name, e.qualified_name, e.file_path, e.line_start, e.docstring, rank
             FROM elements_fts fts
             JOIN elements e ON e.rowid = fts.rowid
             WHERE elements_fts MATCH ?1 AND e.codebase_id = ?2{documented_filter}
             ORDER BY rank
             LIMIT ?3"
        );

        let mut rows = self
            .conn
            .query(&sql, params![match_expr.as_str(), codebase_id, k as i64])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let kind: String = row.get(0).map_err(db_err)?;
            results.push(SimilarElement {
                kind: if kind == "class" {
                    ElementKind::Class
                } else {
                    ElementKind::Function
                },
                name: row.get(1).map_err(db_err)?,
                qualified_name: row.get(2).map_err(db_err)?,
                file_path: row.get(3).map_err(db_err)?,
                line_start: row.get::<i64>(4).map_err(db_err)? as usize,
                docstring: row.get::<String>(5).ok(),
                score: row.get(6).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Generation cache
    // -----------------------------------------------------------------------

    /// Cached provider output for a prompt, if any.
    pub async fn get_cached_generation(
        &self,
        provider: &str,
        model_id: &str,
        prompt_hash: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result FROM generation_cache
                 WHERE provider = ?1 AND model_id = ?2 AND prompt_hash = ?3",
                params![provider, model_id, prompt_hash],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    /// Store provider output for a prompt (upserts).
    pub async fn set_cached_generation(
        &self,
        provider: &str,
        model_id: &str,
        prompt_hash: &str,
        result: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO generation_cache (id, provider, model_id, prompt_hash, result, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(provider, model_id, prompt_hash) DO UPDATE SET
                   result = excluded.result,
                   created_at = excluded.created_at",
                params![id.as_str(), provider, model_id, prompt_hash, result, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Drop every cached generation. Returns the number of rows removed.
    pub async fn clear_generation_cache(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM generation_cache", params![])
            .await
            .map_err(db_err)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a command run under the caller's run id.
    pub async fn insert_run(&self, run_id: &str, codebase_id: &str, command: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, codebase_id, command, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![run_id, codebase_id, command, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Mark a run finished with its stats.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Recent runs for a codebase, newest first.
    pub async fn list_runs(&self, codebase_id: &str, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, command, started_at, finished_at, stats_json FROM runs
                 WHERE codebase_id = ?1 ORDER BY started_at DESC, id DESC LIMIT ?2",
                params![codebase_id, limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(RunRecord {
                id: row.get(0).map_err(db_err)?,
                command: row.get(1).map_err(db_err)?,
                started_at: row.get(2).map_err(db_err)?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }
}

/// An indexed element returned by [`Storage::search_similar`].
#[derive(Debug, Clone)]
pub struct SimilarElement {
    pub kind: ElementKind,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub line_start: usize,
    pub docstring: Option<String>,
    /// FTS5 rank (lower is better).
    pub score: f64,
}

/// A row of run history.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub command: String,
    pub started_at: String,
    /// `None` while the run is in progress or if it aborted.
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// Canonical string form of a codebase root, as stored.
fn canonical_root(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    canonical.to_string_lossy().to_string()
}

/// Id [`Storage::upsert_codebase`] assigns to `root`, computed without a
/// database.
pub fn codebase_id_for(root: &Path) -> String {
    codebase_id(&canonical_root(root))
}

/// Stable id for a codebase root: hex SHA-256 of the path.
pub fn codebase_id(root: &str) -> String {
    let digest = Sha256::digest(root.as_bytes());
    format!("{digest:x}")
}

/// Searchable text for an element: its signature plus its identifiers split
/// into words, since FTS5 keeps `camelCase` runs as single tokens.
fn body_text(el: &CodeElement) -> String {
    let mut text = el.signature.clone();
    for word in identifier_words(&el.qualified_name())
        .into_iter()
        .chain(el.args.iter().flat_map(|a| identifier_words(a)))
    {
        text.push(' ');
        text.push_str(&word);
    }
    text
}

/// Lowercased words of `text`, splitting on punctuation, `snake_case`, and
/// `camelCase` boundaries. Deduplicated, first occurrence order kept.
pub fn identifier_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut push = |word: &mut String| {
        if !word.is_empty() {
            let w = word.to_lowercase();
            if !words.contains(&w) {
                words.push(w);
            }
            word.clear();
        }
    };

    let mut current = String::new();
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            push(&mut current);
            prev = None;
            continue;
        }
        let boundary = prev.is_some_and(|p| {
            (p.is_lowercase() && c.is_uppercase()) || (p.is_alphabetic() != c.is_alphabetic())
        });
        if boundary {
            push(&mut current);
        }
        current.push(c);
        prev = Some(c);
    }
    push(&mut current);
    words
}
