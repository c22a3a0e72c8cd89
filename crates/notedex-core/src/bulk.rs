//! Chunked multi-row writes.
//!
//! Rows are validated up front, then written as one `INSERT ... VALUES (..),(..)`
//! statement per chunk. Both entry points take a plain `&Connection`, so an open
//! `rusqlite::Transaction` (which derefs to one) composes the chunks into a
//! single unit of work. Without a transaction each chunk commits on its own.

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::error::{NotedexError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const MAX_BATCH_SIZE: usize = 1000;

/// SQLITE_MAX_VARIABLE_NUMBER of the bundled engine.
const MAX_BOUND_PARAMETERS: usize = 32_766;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkWriter {
    batch_size: usize,
}

impl Default for BulkWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BulkWriter {
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rows per statement for a given width, bounded by the engine's parameter limit.
    #[must_use]
    pub fn chunk_rows(&self, column_count: usize) -> usize {
        let by_params = MAX_BOUND_PARAMETERS / column_count.max(1);
        self.batch_size.min(by_params).max(1)
    }

    pub fn insert(
        &self,
        conn: &Connection,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        validate_shape(table, columns, rows)?;
        let head = insert_head(table, columns);
        self.execute_chunks(conn, table, columns.len(), rows, &head, "")
    }

    /// Insert-or-update keyed on `conflict_columns`. Only `update_columns` are
    /// overwritten on conflict; an empty list leaves existing rows untouched.
    pub fn upsert(
        &self,
        conn: &Connection,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        validate_shape(table, columns, rows)?;
        if conflict_columns.is_empty() {
            return Err(NotedexError::Validation(format!(
                "upsert into {table} requires at least one conflict column"
            )));
        }
        for column in conflict_columns.iter().chain(update_columns) {
            validate_identifier(column)?;
            if !columns.contains(column) {
                return Err(NotedexError::Validation(format!(
                    "upsert column {column} is not among the inserted columns of {table}"
                )));
            }
        }

        let conflict = conflict_columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let tail = if update_columns.is_empty() {
            format!(" ON CONFLICT({conflict}) DO NOTHING")
        } else {
            let assignments = update_columns
                .iter()
                .map(|c| {
                    let quoted = quote_identifier(c);
                    format!("{quoted} = excluded.{quoted}")
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(" ON CONFLICT({conflict}) DO UPDATE SET {assignments}")
        };

        let head = insert_head(table, columns);
        self.execute_chunks(conn, table, columns.len(), rows, &head, &tail)
    }

    fn execute_chunks(
        &self,
        conn: &Connection,
        table: &str,
        width: usize,
        rows: &[Vec<Value>],
        head: &str,
        tail: &str,
    ) -> Result<usize> {
        let chunk_rows = self.chunk_rows(width);
        let mut affected = 0usize;
        let mut chunks = 0usize;
        for chunk in rows.chunks(chunk_rows) {
            let sql = format!("{head}{}{tail}", values_clause(width, chunk.len()));
            // Full-size chunks share one SQL text; keep it in the statement cache.
            let mut stmt = conn.prepare_cached(&sql)?;
            affected += stmt.execute(params_from_iter(chunk.iter().flatten()))?;
            chunks += 1;
        }
        debug!(table, rows = rows.len(), chunks, affected, "bulk write");
        Ok(affected)
    }
}

fn validate_shape(table: &str, columns: &[&str], rows: &[Vec<Value>]) -> Result<()> {
    validate_identifier(table)?;
    if columns.is_empty() {
        return Err(NotedexError::Validation(format!(
            "bulk write into {table} requires at least one column"
        )));
    }
    for column in columns {
        validate_identifier(column)?;
    }
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(NotedexError::Validation(format!(
                "row {idx} for {table} has {} values, expected {}",
                row.len(),
                columns.len()
            )));
        }
    }
    Ok(())
}

/// Table and column names are interpolated into SQL, so only plain identifiers pass.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(NotedexError::Validation(format!(
            "invalid SQL identifier: {name:?}"
        )))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

fn insert_head(table: &str, columns: &[&str]) -> String {
    let columns = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({columns}) VALUES ", quote_identifier(table))
}

fn values_clause(width: usize, rows: usize) -> String {
    let tuple = format!("({})", vec!["?"; width].join(", "));
    vec![tuple; rows].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            r"
            CREATE TABLE tags (
                note_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                weight INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (note_id, tag)
            );
            ",
        )
        .expect("schema");
        conn
    }

    fn tag_rows(count: i64, weight: i64) -> Vec<Vec<Value>> {
        (0..count)
            .map(|i| {
                vec![
                    Value::Integer(i / 10),
                    Value::Text(format!("tag-{i}")),
                    Value::Integer(weight),
                ]
            })
            .collect()
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn empty_input_is_a_noop() {
        let conn = memory_db();
        let writer = BulkWriter::default();
        assert_eq!(
            writer
                .insert(&conn, "tags", &["note_id", "tag"], &[])
                .expect("insert"),
            0
        );
        assert_eq!(
            writer
                .upsert(&conn, "tags", &["note_id", "tag"], &[], &["note_id"], &[])
                .expect("upsert"),
            0
        );
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn insert_spans_multiple_chunks() {
        let conn = memory_db();
        let writer = BulkWriter::new(7);
        let rows = tag_rows(50, 1);
        let affected = writer
            .insert(&conn, "tags", &["note_id", "tag", "weight"], &rows)
            .expect("insert");
        assert_eq!(affected, 50);
        assert_eq!(count(&conn), 50);
    }

    #[test]
    fn batch_size_is_clamped_and_bounded_by_parameter_limit() {
        assert_eq!(BulkWriter::new(0).batch_size(), 1);
        assert_eq!(BulkWriter::new(50_000).batch_size(), MAX_BATCH_SIZE);
        let writer = BulkWriter::new(MAX_BATCH_SIZE);
        assert_eq!(writer.chunk_rows(3), MAX_BATCH_SIZE);
        assert_eq!(writer.chunk_rows(100), MAX_BOUND_PARAMETERS / 100);
    }

    #[test]
    fn row_width_mismatch_fails_whole_batch() {
        let conn = memory_db();
        let mut rows = tag_rows(5, 1);
        rows[3].pop();
        let err = BulkWriter::default()
            .insert(&conn, "tags", &["note_id", "tag", "weight"], &rows)
            .expect_err("must fail");
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(err.to_string().contains("row 3"), "{err}");
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn upsert_twice_matches_upsert_once() {
        let conn = memory_db();
        let writer = BulkWriter::new(4);
        let columns = ["note_id", "tag", "weight"];
        let rows = tag_rows(13, 2);

        writer
            .upsert(&conn, "tags", &columns, &rows, &["note_id", "tag"], &["weight"])
            .expect("first");
        let snapshot = |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT note_id, tag, weight FROM tags ORDER BY note_id, tag")
                .expect("prepare");
            stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .expect("query")
            .collect::<rusqlite::Result<Vec<_>>>()
            .expect("rows")
        };
        let once = snapshot(&conn);
        writer
            .upsert(&conn, "tags", &columns, &rows, &["note_id", "tag"], &["weight"])
            .expect("second");
        assert_eq!(snapshot(&conn), once);
    }

    #[test]
    fn upsert_updates_only_designated_columns() {
        let conn = memory_db();
        let writer = BulkWriter::default();
        let columns = ["note_id", "tag", "weight"];
        writer
            .insert(&conn, "tags", &columns, &tag_rows(3, 1))
            .expect("seed");
        writer
            .upsert(&conn, "tags", &columns, &tag_rows(3, 9), &["note_id", "tag"], &["weight"])
            .expect("upsert");
        let weight: i64 = conn
            .query_row("SELECT MAX(weight) FROM tags", [], |row| row.get(0))
            .expect("weight");
        assert_eq!(weight, 9);

        writer
            .upsert(&conn, "tags", &columns, &tag_rows(3, 4), &["note_id", "tag"], &[])
            .expect("do nothing");
        let weight: i64 = conn
            .query_row("SELECT MIN(weight) FROM tags", [], |row| row.get(0))
            .expect("weight");
        assert_eq!(weight, 9);
        assert_eq!(count(&conn), 3);
    }

    #[test]
    fn plain_insert_is_not_retry_safe() {
        let conn = memory_db();
        let writer = BulkWriter::default();
        let columns = ["note_id", "tag", "weight"];
        writer
            .insert(&conn, "tags", &columns, &tag_rows(2, 1))
            .expect("first");
        let err = writer
            .insert(&conn, "tags", &columns, &tag_rows(2, 1))
            .expect_err("duplicate keys");
        assert_eq!(err.code(), "SQLITE_ERROR");
    }

    #[test]
    fn transaction_rolls_back_every_chunk() {
        let mut conn = memory_db();
        let writer = BulkWriter::new(2);
        {
            let tx = conn.transaction().expect("tx");
            writer
                .insert(&tx, "tags", &["note_id", "tag", "weight"], &tag_rows(9, 1))
                .expect("insert");
            tx.rollback().expect("rollback");
        }
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn identifiers_are_validated() {
        let conn = memory_db();
        let writer = BulkWriter::default();
        let rows = vec![vec![Value::Integer(1)]];
        let err = writer
            .insert(&conn, "tags; DROP TABLE tags", &["note_id"], &rows)
            .expect_err("bad table");
        assert_eq!(err.code(), "VALIDATION_FAILED");
        let err = writer
            .upsert(&conn, "tags", &["note_id"], &rows, &["note_id"], &["weight"])
            .expect_err("update column not inserted");
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(count(&conn), 0);
    }
}
