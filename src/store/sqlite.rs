//! SQLite storage for transfer-log rows
//!
//! Rows are keyed by `{block}x{tx_index}x{log_index}` and indexed by
//! signature. Raw words and encoded arguments are stored as JSON so a row
//! loads back whole. The encoded arguments are also kept one per line in
//! `tx_log_args`, and compiled queries run as SQL against that table.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{LogStore, TxLogRow};
use crate::query::{Cmp, LogQuery, PhysicalQuery, RowField};

pub struct SqliteLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogStore {
    /// Create or open the database
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open log database at {db_path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::init(conn, db_path)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(conn: Connection, db_path: &str) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tx_logs (
                id TEXT PRIMARY KEY,
                block_number INTEGER NOT NULL,
                tx_index INTEGER NOT NULL,
                log_index INTEGER NOT NULL,
                removed INTEGER NOT NULL DEFAULT 0,
                signature TEXT NOT NULL,
                address TEXT NOT NULL,
                log_values TEXT NOT NULL,
                data_values_start INTEGER,
                args TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_logs_signature
             ON tx_logs(signature, block_number, tx_index, log_index)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_logs_address ON tx_logs(address)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tx_log_args (
                log_id TEXT NOT NULL,
                e INTEGER NOT NULL,
                c TEXT NOT NULL,
                idx INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_log_args_value ON tx_log_args(idx, e, c)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_log_args_log ON tx_log_args(log_id)",
            [],
        )?;

        tracing::info!(target: "reconciler::store", db_path = %db_path, "Log database initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Log database lock poisoned: {e}"))
    }

    /// Fetch one row by id.
    pub fn get(&self, id: &str) -> Result<Option<TxLogRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT block_number, tx_index, log_index, removed, signature, address,
                        log_values, data_values_start, args
                 FROM tx_logs WHERE id = ?1",
                params![id],
                read_row,
            )
            .optional()?;
        row.map(TxLogRow::try_from).transpose()
    }

    fn select_distinct(&self, field: RowField, query: &LogQuery) -> Result<Vec<String>> {
        let mut sql = format!(
            "SELECT {} FROM tx_logs WHERE signature = ? AND ",
            field.as_str()
        );
        let mut values = vec![Value::Text(query.signature.to_ascii_lowercase())];
        push_condition(&query.predicate, &mut sql, &mut values);
        sql.push_str(" ORDER BY block_number, tx_index, log_index");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().unique().collect())
    }
}

/// Limbs as stored in `tx_log_args.c`.
fn limbs_key(c: &[u64]) -> String {
    format!("[{}]", c.iter().join(","))
}

fn sql_op(cmp: Cmp) -> &'static str {
    match cmp {
        Cmp::Eq => "=",
        Cmp::Ne => "<>",
    }
}

/// Append `query` as a condition on `tx_logs`, pushing its bound values in
/// placeholder order.
fn push_condition(query: &PhysicalQuery, sql: &mut String, values: &mut Vec<Value>) {
    match query {
        PhysicalQuery::And(parts) => push_joined(parts, " AND ", "1", sql, values),
        PhysicalQuery::Or(parts) => push_joined(parts, " OR ", "0", sql, values),
        PhysicalQuery::Not(inner) => {
            sql.push_str("NOT (");
            push_condition(inner, sql, values);
            sql.push(')');
        }
        PhysicalQuery::Arg(predicate) => {
            sql.push_str(&format!(
                "id IN (SELECT log_id FROM tx_log_args WHERE e {} ? AND c {} ? AND idx {} ?)",
                sql_op(predicate.e),
                sql_op(predicate.c),
                sql_op(predicate.index)
            ));
            values.push(Value::Integer(i64::from(predicate.arg.e)));
            values.push(Value::Text(limbs_key(&predicate.arg.c)));
            values.push(Value::Integer(predicate.arg.index as i64));
        }
        PhysicalQuery::Field { field, value } => {
            sql.push_str(field.as_str());
            sql.push_str(" = ?");
            values.push(Value::Text(value.to_ascii_lowercase()));
        }
    }
}

fn push_joined(
    parts: &[PhysicalQuery],
    separator: &str,
    empty: &str,
    sql: &mut String,
    values: &mut Vec<Value>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        push_condition(part, sql, values);
    }
    sql.push(')');
}

/// Columns of one `tx_logs` row, JSON payloads still undecoded.
struct StoredRow {
    block_number: i64,
    tx_index: i64,
    log_index: i64,
    removed: bool,
    signature: String,
    address: String,
    values: String,
    data_values_start: Option<i64>,
    args: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        block_number: row.get(0)?,
        tx_index: row.get(1)?,
        log_index: row.get(2)?,
        removed: row.get(3)?,
        signature: row.get(4)?,
        address: row.get(5)?,
        values: row.get(6)?,
        data_values_start: row.get(7)?,
        args: row.get(8)?,
    })
}

impl TryFrom<StoredRow> for TxLogRow {
    type Error = anyhow::Error;

    fn try_from(stored: StoredRow) -> Result<Self> {
        Ok(Self {
            block_number: stored.block_number as u64,
            tx_index: stored.tx_index as u64,
            log_index: stored.log_index as u64,
            removed: stored.removed,
            signature: stored.signature,
            address: stored.address,
            values: serde_json::from_str(&stored.values).context("Invalid log_values column")?,
            data_values_start: stored.data_values_start.map(|start| start as usize),
            args: serde_json::from_str(&stored.args).context("Invalid args column")?,
        })
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn insert(&self, rows: &[TxLogRow]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO tx_logs
                    (id, block_number, tx_index, log_index, removed, signature, address,
                     log_values, data_values_start, args)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            let mut clear_args = tx.prepare_cached("DELETE FROM tx_log_args WHERE log_id = ?1")?;
            let mut insert_arg = tx.prepare_cached(
                "INSERT INTO tx_log_args (log_id, e, c, idx) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                let id = row.id();
                clear_args.execute(params![id])?;
                for arg in &row.args {
                    insert_arg.execute(params![
                        id,
                        i64::from(arg.e),
                        limbs_key(&arg.c),
                        arg.index as i64
                    ])?;
                }
                stmt.execute(params![
                    id,
                    row.block_number as i64,
                    row.tx_index as i64,
                    row.log_index as i64,
                    row.removed,
                    row.signature.to_ascii_lowercase(),
                    row.address.to_ascii_lowercase(),
                    serde_json::to_string(&row.values)?,
                    row.data_values_start.map(|start| start as i64),
                    serde_json::to_string(&row.args)?,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(target: "reconciler::store", count = rows.len(), "Inserted log rows");
        Ok(rows.len())
    }

    async fn distinct(&self, field: RowField, query: &LogQuery) -> Result<Vec<String>> {
        let values = self.select_distinct(field, query)?;
        tracing::debug!(
            target: "reconciler::store",
            field = field.as_str(),
            distinct = values.len(),
            "Distinct query executed"
        );
        Ok(values)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tx_logs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{transfer_signature, LogicalFilter, Negation, QueryCompiler};
    use crate::store::{MemoryLogStore, RawLog};

    fn topic(hex: &str) -> String {
        format!("0x{hex:0>64}")
    }

    fn transfer(block: u64, token: &str, from: &str, to: &str) -> TxLogRow {
        TxLogRow::from_log(&RawLog {
            block_number: block,
            address: token.into(),
            topics: vec![transfer_signature().into(), topic(from), topic(to)],
            data: topic("64"),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let store = SqliteLogStore::in_memory().unwrap();
        let row = transfer(1, "0xAA", "a1", "b2");
        assert_eq!(store.insert(std::slice::from_ref(&row)).await.unwrap(), 1);

        let loaded = store.get(&row.id()).unwrap().unwrap();
        assert_eq!(loaded, row);
        assert!(store.get("9x9x9").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_replaces_same_id() {
        let store = SqliteLogStore::in_memory().unwrap();
        store.insert(&[transfer(1, "0xaa", "a1", "b2")]).await.unwrap();
        store.insert(&[transfer(1, "0xbb", "a1", "b2")]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let query = QueryCompiler::transfer()
            .compile(&LogicalFilter::eq("to", topic("b2")))
            .unwrap();
        assert_eq!(
            store.distinct(RowField::Address, &query).await.unwrap(),
            vec!["0xbb".to_string()]
        );
    }

    #[tokio::test]
    async fn test_distinct_addresses() {
        let store = SqliteLogStore::in_memory().unwrap();
        store
            .insert(&[
                transfer(1, "0xaa", "a1", "b2"),
                transfer(2, "0xbb", "b2", "c3"),
                transfer(3, "0xaa", "c3", "b2"),
                transfer(4, "0xcc", "c3", "d4"),
            ])
            .await
            .unwrap();

        let compiler = QueryCompiler::transfer();
        let query = compiler.compile(&LogicalFilter::touching(&topic("b2"))).unwrap();
        let tokens = store.distinct(RowField::Address, &query).await.unwrap();
        assert_eq!(tokens, vec!["0xaa".to_string(), "0xbb".to_string()]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");
        let path = path.to_string_lossy();

        {
            let store = SqliteLogStore::new(&path).unwrap();
            store.insert(&[transfer(5, "0xaa", "a1", "b2")]).await.unwrap();
        }

        let store = SqliteLogStore::new(&path).unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sql_matches_in_process_evaluation() {
        let rows = vec![
            transfer(1, "0xaa", "a1", "b2"),
            transfer(2, "0xbb", "b2", "c3"),
            transfer(3, "0xaa", "c3", "b2"),
            transfer(4, "0xcc", "c3", "d4"),
            transfer(5, "0xdd", "d4", "a1"),
        ];
        let sqlite = SqliteLogStore::in_memory().unwrap();
        sqlite.insert(&rows).await.unwrap();
        let memory = MemoryLogStore::with_rows(rows);

        let filters = [
            LogicalFilter::any(),
            LogicalFilter::touching(&topic("b2")),
            LogicalFilter::Not(Box::new(LogicalFilter::touching(&topic("b2")))),
            LogicalFilter::ne("from", topic("c3")),
            LogicalFilter::not_in("to", [topic("b2"), topic("d4")]),
            LogicalFilter::Or(vec![
                LogicalFilter::Address("0xCC".into()),
                LogicalFilter::eq("to", topic("a1")),
            ]),
            LogicalFilter::And(vec![
                LogicalFilter::eq("value", "0x64"),
                LogicalFilter::is_in("from", [topic("a1"), topic("d4")]),
            ]),
            LogicalFilter::Not(Box::new(LogicalFilter::is_in("to", Vec::<String>::new()))),
        ];
        for negation in [Negation::Complement, Negation::FieldWise] {
            let compiler = QueryCompiler::transfer().with_negation(negation);
            for filter in &filters {
                let query = compiler.compile(filter).unwrap();
                for field in [RowField::Address, RowField::Signature] {
                    assert_eq!(
                        sqlite.distinct(field, &query).await.unwrap(),
                        memory.distinct(field, &query).await.unwrap(),
                        "{negation:?} {filter:?}"
                    );
                }
            }
        }
    }
}
