//! Ranked full-text search over the `notes_fts` shadow table.
//!
//! User input never reaches the FTS5 grammar as written: every whitespace token
//! is quoted as a phrase and the phrases are OR-ed together. The shadow table is
//! maintained by store triggers, so this engine only reads.
//!
//! Ranking is FTS5 `bm25` ascending (lower is more relevant). Hits with equal
//! scores come back in no guaranteed order.

use rusqlite::{Connection, Row, params};
use tracing::{debug, info, warn};

use crate::error::{NotedexError, Result, StorageContext};
use crate::models::SearchResult;
use crate::state::SqliteStateStore;

pub const DEFAULT_SNIPPET_TOKENS: usize = 24;
/// FTS5 rejects snippet lengths above 64 tokens.
pub const MAX_SNIPPET_TOKENS: usize = 64;

pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";
const SNIPPET_ELLIPSIS: &str = "…";

const RESERVED_OPERATORS: [&str; 4] = ["AND", "OR", "NOT", "NEAR"];

const FTS_SYNTAX_ERROR_MARKERS: [&str; 4] = [
    "fts5: syntax error",
    "unterminated string",
    "unknown special query",
    "malformed match",
];

#[derive(Debug, Clone)]
pub struct SearchEngine {
    store: SqliteStateStore,
    snippet_tokens: usize,
}

/// Whether each of the three sync triggers is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TriggerStatus {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl TriggerStatus {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.insert && self.update && self.delete
    }
}

impl SearchEngine {
    #[must_use]
    pub fn new(store: SqliteStateStore) -> Self {
        Self::with_snippet_tokens(store, DEFAULT_SNIPPET_TOKENS)
    }

    #[must_use]
    pub fn with_snippet_tokens(store: SqliteStateStore, snippet_tokens: usize) -> Self {
        Self {
            store,
            snippet_tokens: snippet_tokens.clamp(1, MAX_SNIPPET_TOKENS),
        }
    }

    pub fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<SearchResult>> {
        let Some(expression) = sanitize_query(query) else {
            debug!("query has no searchable terms");
            return Ok(Vec::new());
        };
        self.run_ranked(
            r"
            SELECT n.id, n.title, n.body, n.collection_id, bm25(notes_fts) AS rank
            FROM notes_fts
            JOIN notes n ON n.id = notes_fts.rowid
            WHERE notes_fts MATCH ?1
            ORDER BY rank ASC
            LIMIT ?2 OFFSET ?3
            ",
            &expression,
            limit,
            offset,
        )
    }

    /// Like [`SearchEngine::search`] with `body` replaced by a highlighted excerpt.
    /// Hits that match only in the title get the highlighted title instead.
    pub fn search_with_snippet(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>> {
        let Some(expression) = sanitize_query(query) else {
            debug!("query has no searchable terms");
            return Ok(Vec::new());
        };
        let sql = format!(
            r"
            SELECT n.id, n.title,
                   CASE
                       WHEN instr({body_snippet}, '{HIGHLIGHT_OPEN}') > 0 THEN {body_snippet}
                       ELSE highlight(notes_fts, 0, '{HIGHLIGHT_OPEN}', '{HIGHLIGHT_CLOSE}')
                   END,
                   n.collection_id, bm25(notes_fts) AS rank
            FROM notes_fts
            JOIN notes n ON n.id = notes_fts.rowid
            WHERE notes_fts MATCH ?1
            ORDER BY rank ASC
            LIMIT ?2 OFFSET ?3
            ",
            body_snippet = format!(
                "snippet(notes_fts, 1, '{HIGHLIGHT_OPEN}', '{HIGHLIGHT_CLOSE}', '{SNIPPET_ELLIPSIS}', {})",
                self.snippet_tokens
            )
        );
        self.run_ranked(&sql, &expression, limit, offset)
    }

    pub fn count(&self, query: &str) -> Result<u64> {
        let Some(expression) = sanitize_query(query) else {
            return Ok(0);
        };
        self.store
            .with_conn(|conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM notes_fts WHERE notes_fts MATCH ?1",
                    params![expression],
                    |row| row.get::<_, i64>(0),
                );
                match count {
                    Ok(count) => Ok(u64::try_from(count).unwrap_or(0)),
                    Err(err) if is_fts_syntax_error(&err) => {
                        warn!(error = %err, "fts count degraded to zero");
                        Ok(0)
                    }
                    Err(err) => Err(err.into()),
                }
            })
            .storage_context("search_count", query)
    }

    pub fn verify_triggers(&self) -> Result<TriggerStatus> {
        self.store.with_conn(|conn| {
            Ok(TriggerStatus {
                insert: trigger_exists(conn, "notes_fts_ai")?,
                update: trigger_exists(conn, "notes_fts_au")?,
                delete: trigger_exists(conn, "notes_fts_ad")?,
            })
        })
    }

    /// Repopulates the shadow table from `notes`.
    pub fn rebuild(&self) -> Result<()> {
        self.store
            .with_conn(|conn| {
                conn.execute("INSERT INTO notes_fts(notes_fts) VALUES ('rebuild')", [])?;
                Ok(())
            })
            .storage_context("search_rebuild", "notes_fts")?;
        info!("full-text shadow rebuilt");
        Ok(())
    }

    fn run_ranked(
        &self,
        sql: &str,
        expression: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store
            .with_conn(|conn| {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                let offset = i64::try_from(offset).unwrap_or(i64::MAX);
                match query_results(conn, sql, expression, limit, offset) {
                    Ok(results) => {
                        debug!(hits = results.len(), "fts query");
                        Ok(results)
                    }
                    Err(err) if is_fts_syntax_error(&err) => {
                        warn!(error = %err, "fts query degraded to zero results");
                        Ok(Vec::new())
                    }
                    Err(err) => Err(NotedexError::Sqlite(err)),
                }
            })
            .storage_context("search", expression)
    }
}

fn query_results(
    conn: &Connection,
    sql: &str,
    expression: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<SearchResult>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![expression, limit, offset], result_from_row)?;
    rows.collect()
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<SearchResult> {
    Ok(SearchResult {
        note_id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        collection_id: row.get(3)?,
        rank: row.get(4)?,
    })
}

fn trigger_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name = ?1",
        params![name],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count > 0)
}

/// Builds a MATCH expression that can only mean "any of these words".
///
/// Tokens without a letter or digit are dropped, as are bare FTS operators.
/// Each survivor becomes a quoted phrase with inner quotes doubled. Returns
/// `None` when nothing searchable remains.
#[must_use]
pub fn sanitize_query(raw: &str) -> Option<String> {
    let terms = raw
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .filter(|token| {
            !RESERVED_OPERATORS
                .iter()
                .any(|op| token.eq_ignore_ascii_case(op))
        })
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// True when the engine rejected the MATCH expression itself, as opposed to a
/// storage fault.
#[must_use]
pub fn is_fts_syntax_error(err: &rusqlite::Error) -> bool {
    let message = match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.to_ascii_lowercase(),
        rusqlite::Error::SqliteFailure(failure, None) => failure.to_string().to_ascii_lowercase(),
        _ => return false,
    };
    FTS_SYNTAX_ERROR_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::state::NoteWrite;

    fn seeded_engine() -> (tempfile::TempDir, SqliteStateStore, SearchEngine) {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStateStore::open(temp.path().join("state.db")).expect("open");
        for (title, body) in [
            ("Rust ownership", "Borrowing rules keep rust programs memory safe."),
            ("Garden log", "Planted tomatoes and basil in the raised bed."),
            ("Database internals", "SQLite full text search uses an inverted index. Rust binds it."),
        ] {
            store
                .write_note(&NoteWrite {
                    title: title.to_string(),
                    body: body.to_string(),
                    collection_id: None,
                    source_key: None,
                    frontmatter: serde_json::Map::new(),
                    content_hash: blake3::hash(body.as_bytes()).to_hex().to_string(),
                    tags: Vec::new(),
                    links: Vec::new(),
                })
                .expect("write");
        }
        let engine = SearchEngine::new(store.clone());
        (temp, store, engine)
    }

    #[test]
    fn sanitize_quotes_every_term_and_drops_operators() {
        assert_eq!(
            sanitize_query("rust AND \"db OR near"),
            Some("\"rust\" OR \"\"\"db\"".to_string())
        );
        assert_eq!(sanitize_query("title:secret*"), Some("\"title:secret*\"".to_string()));
        assert_eq!(sanitize_query("   "), None);
        assert_eq!(sanitize_query("AND OR NOT ( ) * -"), None);
    }

    #[test]
    fn search_ranks_matches_and_count_agrees() {
        let (_temp, _store, engine) = seeded_engine();
        let hits = engine.search("rust", 10, 0).expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits.windows(2).all(|pair| pair[0].rank <= pair[1].rank));
        assert_eq!(engine.count("rust").expect("count"), hits.len() as u64);

        let any = engine.search("basil sqlite", usize::MAX, 0).expect("or");
        assert_eq!(any.len(), 2);
        assert_eq!(engine.count("basil sqlite").expect("count"), 2);

        let page = engine.search("rust", 1, 1).expect("page");
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn snippets_highlight_matched_terms() {
        let (_temp, _store, engine) = seeded_engine();
        let hits = engine
            .search_with_snippet("tomatoes", 10, 0)
            .expect("snippet");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].body.contains("<mark>tomatoes</mark>"));
        assert_eq!(hits[0].title, "Garden log");
    }

    #[test]
    fn title_only_hits_get_a_highlighted_title() {
        let (_temp, _store, engine) = seeded_engine();
        let hits = engine.search_with_snippet("garden", 10, 0).expect("snippet");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, "<mark>Garden</mark> log");

        let hits = engine.search_with_snippet("ownership", 10, 0).expect("snippet");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, "Rust <mark>ownership</mark>");
    }

    #[test]
    fn adversarial_queries_return_nothing_and_leave_table_intact() {
        let (_temp, store, engine) = seeded_engine();
        for query in [
            "'; DROP TABLE notes; --",
            "\"unbalanced",
            "AND OR NOT",
            "NEAR(",
            "title:*",
            ")))",
            "\"\"\"",
        ] {
            assert!(
                engine.search(query, 10, 0).expect("search").is_empty(),
                "query {query:?} should match nothing"
            );
            assert!(engine
                .search_with_snippet(query, 10, 0)
                .expect("snippet")
                .is_empty());
            assert_eq!(engine.count(query).expect("count"), 0);
        }
        assert_eq!(store.count_notes().expect("notes"), 3);
        assert_eq!(engine.search("garden", 10, 0).expect("after").len(), 1);
    }

    #[test]
    fn edits_and_deletes_flow_through_triggers() {
        let (_temp, store, engine) = seeded_engine();
        let id = engine.search("basil", 10, 0).expect("search")[0].note_id;
        store.delete_note(id).expect("delete");
        assert!(engine.search("basil", 10, 0).expect("search").is_empty());

        let status = engine.verify_triggers().expect("triggers");
        assert!(status.is_complete());
        engine.rebuild().expect("rebuild");
        assert_eq!(engine.count("rust").expect("count"), 2);
    }

    #[test]
    fn syntax_errors_are_classified() {
        let conn = Connection::open_in_memory().expect("memory db");
        conn.execute_batch("CREATE VIRTUAL TABLE t USING fts5(body);")
            .expect("fts table");
        let err = conn
            .query_row("SELECT COUNT(*) FROM t WHERE t MATCH '\"oops'", [], |row| {
                row.get::<_, i64>(0)
            })
            .expect_err("syntax error");
        assert!(is_fts_syntax_error(&err));

        let err = conn
            .query_row("SELECT * FROM missing_table", [], |row| row.get::<_, i64>(0))
            .expect_err("missing table");
        assert!(!is_fts_syntax_error(&err));

        let err = conn
            .query_row("SELECT missing_col FROM t", [], |row| row.get::<_, i64>(0))
            .expect_err("missing column");
        assert!(!is_fts_syntax_error(&err));
    }
}
