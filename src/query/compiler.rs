//! Query compiler entry point.

use std::sync::Arc;

use serde_json::Value;

use super::error::Unsatisfiable;
use super::filter::LogicalFilter;
use super::physical::LogQuery;
use super::schema::EventSchema;
use super::translate::{Negation, Translator};

/// Compiles logical filters for one event schema.
///
/// Pure and `Send + Sync`; share one instance across tasks.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    schema: Arc<EventSchema>,
    negation: Negation,
}

impl QueryCompiler {
    pub fn new(schema: EventSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            negation: Negation::default(),
        }
    }

    /// Compiler for ERC20 `Transfer` logs.
    pub fn transfer() -> Self {
        Self::new(EventSchema::transfer())
    }

    pub fn with_negation(mut self, negation: Negation) -> Self {
        self.negation = negation;
        self
    }

    pub fn schema(&self) -> &EventSchema {
        &self.schema
    }

    pub fn negation(&self) -> Negation {
        self.negation
    }

    /// Signature-scoped physical query for `filter`.
    ///
    /// Empty lists only fail the compilation when the whole filter reduces
    /// to matching nothing.
    pub fn compile(&self, filter: &LogicalFilter) -> Result<LogQuery, Unsatisfiable> {
        let predicate = Translator::new(&self.schema, self.negation)
            .translate(filter)
            .and_then(|predicate| {
                if predicate.is_never() {
                    Err(Unsatisfiable::MatchesNothing)
                } else {
                    Ok(predicate)
                }
            })
            .inspect_err(|reason| {
                tracing::debug!(
                    target: "reconciler::query",
                    event = self.schema.name(),
                    %reason,
                    "Filter is unsatisfiable"
                );
            })?;

        tracing::trace!(
            target: "reconciler::query",
            event = self.schema.name(),
            ?predicate,
            "Compiled filter"
        );

        Ok(LogQuery {
            signature: self.schema.signature().to_string(),
            predicate,
        })
    }

    pub fn compile_document(&self, document: &Value) -> Result<LogQuery, Unsatisfiable> {
        self.compile(&LogicalFilter::from_document(document)?)
    }
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::transfer()
    }
}
