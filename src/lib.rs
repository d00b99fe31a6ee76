//! Reconciler - transfer-log queries for balance reconciliation.
//!
//! Balances are recomputed from the chain, but the set of tokens an account
//! has ever touched comes from a local index of raw `Transfer` logs. This
//! crate provides the two halves of that lookup:
//!
//! - [`query`]: compiles filters over decoded event arguments into queries
//!   over the stored, still-encoded rows
//! - [`store`]: the row layout and the stores that execute those queries

pub mod query;
pub mod store;

pub use query::{LogQuery, LogicalFilter, QueryCompiler, Unsatisfiable};
pub use store::{LogStore, MemoryLogStore, RawLog, SqliteLogStore, TxLogRow};
