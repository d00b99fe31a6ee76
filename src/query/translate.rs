//! Predicate translator: logical filter tree to physical query tree.

use super::encoder::TopicArg;
use super::error::Unsatisfiable;
use super::filter::{Condition, LogicalFilter};
use super::physical::{ArgPredicate, PhysicalQuery, RowField};
use super::schema::EventSchema;

/// How `$ne` / `$nin` leaves are expressed physically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Negation {
    /// No element of `args` matches the value at the slot.
    #[default]
    Complement,
    /// Some element differs in exponent, coefficients and slot at once.
    /// Kept for stores queried by older deployments; it does not exclude
    /// rows that carry the value.
    FieldWise,
}

pub(crate) struct Translator<'a> {
    schema: &'a EventSchema,
    negation: Negation,
}

impl<'a> Translator<'a> {
    pub(crate) fn new(schema: &'a EventSchema, negation: Negation) -> Self {
        Self { schema, negation }
    }

    pub(crate) fn translate(&self, filter: &LogicalFilter) -> Result<PhysicalQuery, Unsatisfiable> {
        match filter {
            LogicalFilter::Arg { name, condition } => self.condition(name, condition),
            LogicalFilter::And(parts) => Ok(PhysicalQuery::and(self.translate_all(parts)?)),
            LogicalFilter::Or(parts) => Ok(PhysicalQuery::or(self.translate_all(parts)?)),
            LogicalFilter::Not(inner) => Ok(PhysicalQuery::negate(self.translate(inner)?)),
            LogicalFilter::Address(address) => Ok(PhysicalQuery::Field {
                field: RowField::Address,
                value: address.to_ascii_lowercase(),
            }),
        }
    }

    fn translate_all(&self, parts: &[LogicalFilter]) -> Result<Vec<PhysicalQuery>, Unsatisfiable> {
        parts.iter().map(|part| self.translate(part)).collect()
    }

    fn condition(&self, name: &str, condition: &Condition) -> Result<PhysicalQuery, Unsatisfiable> {
        let slot = self
            .schema
            .slot_of(name)
            .ok_or_else(|| Unsatisfiable::UnknownArgument(name.to_string()))?;

        match condition {
            Condition::Eq(value) => self.leaf(name, slot, value),
            Condition::Ne(value) => self.negated_leaf(name, slot, value),
            Condition::In(values) => {
                // an empty list folds to `PhysicalQuery::never()`
                let leaves = values
                    .iter()
                    .map(|value| self.leaf(name, slot, value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PhysicalQuery::or(leaves))
            }
            Condition::Nin(values) => {
                let leaves = values
                    .iter()
                    .map(|value| self.negated_leaf(name, slot, value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PhysicalQuery::and(leaves))
            }
        }
    }

    fn leaf(&self, name: &str, slot: usize, value: &str) -> Result<PhysicalQuery, Unsatisfiable> {
        let arg = TopicArg::encode(value, slot, name)?;
        Ok(PhysicalQuery::Arg(ArgPredicate::equal(arg)))
    }

    fn negated_leaf(
        &self,
        name: &str,
        slot: usize,
        value: &str,
    ) -> Result<PhysicalQuery, Unsatisfiable> {
        match self.negation {
            Negation::Complement => Ok(PhysicalQuery::negate(self.leaf(name, slot, value)?)),
            Negation::FieldWise => {
                let arg = TopicArg::encode(value, slot, name)?;
                Ok(PhysicalQuery::Arg(ArgPredicate::field_wise_ne(arg)))
            }
        }
    }
}
