//! Stores of persisted transfer-log rows.
//!
//! - [`MemoryLogStore`]: in-process rows, for tests and small deployments
//! - [`SqliteLogStore`]: SQLite persistence, rows indexed by signature

mod memory;
mod row;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::query::{LogQuery, RowField};

pub use memory::MemoryLogStore;
pub use row::{RawLog, TxLogRow};
pub use sqlite::SqliteLogStore;

/// Read side used by balance aggregation, plus the insert used at ingestion.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Insert or replace rows (keyed by [`TxLogRow::id`]). Returns the number
    /// of rows written.
    async fn insert(&self, rows: &[TxLogRow]) -> Result<usize>;

    /// Unique values of `field` over the rows matching `query`, in row order.
    async fn distinct(&self, field: RowField, query: &LogQuery) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;
}
