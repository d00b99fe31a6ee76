//! Predicate compiler for transfer-event logs.
//!
//! A [`LogicalFilter`] names decoded event arguments (`to`, `from`, ...).
//! Stored rows only carry the raw, encoded words of the log, so the
//! [`QueryCompiler`] resolves every argument to its physical slot, encodes
//! each value the way the rows store it and rebuilds the boolean structure
//! as a [`LogQuery`] scoped to the event signature.
//!
//! ```rust,ignore
//! use reconciler::query::{LogicalFilter, QueryCompiler};
//!
//! let compiler = QueryCompiler::transfer();
//! let query = compiler.compile(&LogicalFilter::touching("0xabc"))?;
//! let tokens = store.distinct(RowField::Address, &query).await?;
//! ```

mod compiler;
mod encoder;
mod error;
mod filter;
mod physical;
mod position;
mod schema;
mod translate;

pub use compiler::QueryCompiler;
pub use encoder::{parse_hex_scalar, TopicArg};
pub use error::Unsatisfiable;
pub use filter::{Condition, LogicalFilter};
pub use physical::{ArgPredicate, Cmp, LogQuery, PhysicalQuery, RowField};
pub use schema::{transfer_signature, EventArgument, EventSchema, Transfer};
pub use translate::Negation;
