use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use itertools::Itertools;

use super::{LogStore, TxLogRow};
use crate::query::{LogQuery, RowField};

/// Ordering key: block, transaction, log.
type RowKey = (u64, u64, u64);

#[derive(Debug, Default)]
pub struct MemoryLogStore {
    rows: RwLock<BTreeMap<RowKey, TxLogRow>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<TxLogRow>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.rows.write() {
            for row in rows {
                guard.insert(key(&row), row);
            }
        }
        store
    }

    /// Rows matching `query`, in block order.
    pub fn find(&self, query: &LogQuery) -> Result<Vec<TxLogRow>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow!("Log store lock poisoned: {e}"))?;
        Ok(rows.values().filter(|row| query.matches(row)).cloned().collect())
    }
}

fn key(row: &TxLogRow) -> RowKey {
    (row.block_number, row.tx_index, row.log_index)
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(&self, rows: &[TxLogRow]) -> Result<usize> {
        let mut guard = self
            .rows
            .write()
            .map_err(|e| anyhow!("Log store lock poisoned: {e}"))?;
        for row in rows {
            guard.insert(key(row), row.clone());
        }
        Ok(rows.len())
    }

    async fn distinct(&self, field: RowField, query: &LogQuery) -> Result<Vec<String>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow!("Log store lock poisoned: {e}"))?;
        Ok(rows
            .values()
            .filter(|row| query.matches(row))
            .map(|row| field.read(row).to_string())
            .unique()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow!("Log store lock poisoned: {e}"))?;
        Ok(rows.len())
    }
}
