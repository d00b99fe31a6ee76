//! Physical queries over stored log rows.
//!
//! The algebra is the one the document store speaks natively: boolean
//! composition, an element match over the row's encoded `args` array and
//! plain equality on row fields. [`LogQuery::to_document`] renders it in that
//! syntax; [`LogQuery::matches`] evaluates it in-process with the same
//! semantics.

use serde_json::{json, Map, Value};

use super::encoder::TopicArg;
use crate::store::TxLogRow;

/// Comparison on one component of an element match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cmp {
    Eq,
    Ne,
}

impl Cmp {
    fn test<T: PartialEq + ?Sized>(self, stored: &T, wanted: &T) -> bool {
        match self {
            Self::Eq => stored == wanted,
            Self::Ne => stored != wanted,
        }
    }

    fn render(self, value: Value) -> Value {
        match self {
            Self::Eq => value,
            Self::Ne => json!({ "$ne": value }),
        }
    }
}

/// Positional array-membership predicate: some element of `args` satisfies
/// all three component comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgPredicate {
    pub arg: TopicArg,
    pub e: Cmp,
    pub c: Cmp,
    pub index: Cmp,
}

impl ArgPredicate {
    pub fn equal(arg: TopicArg) -> Self {
        Self {
            arg,
            e: Cmp::Eq,
            c: Cmp::Eq,
            index: Cmp::Eq,
        }
    }

    /// Every component flipped to `$ne`, the legacy negation form.
    pub fn field_wise_ne(arg: TopicArg) -> Self {
        Self {
            arg,
            e: Cmp::Ne,
            c: Cmp::Ne,
            index: Cmp::Ne,
        }
    }

    fn element_matches(&self, stored: &TopicArg) -> bool {
        self.e.test(&stored.e, &self.arg.e)
            && self.c.test(stored.c.as_slice(), self.arg.c.as_slice())
            && self.index.test(&stored.index, &self.arg.index)
    }

    pub fn matches(&self, args: &[TopicArg]) -> bool {
        args.iter().any(|stored| self.element_matches(stored))
    }

    fn element_document(&self) -> Value {
        json!({
            "e": self.e.render(json!(self.arg.e)),
            "c": self.c.render(json!(self.arg.c)),
            "index": self.index.render(json!(self.arg.index)),
        })
    }
}

/// Scalar row fields usable in equality clauses and `distinct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowField {
    Address,
    Signature,
}

impl RowField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Signature => "signature",
        }
    }

    pub fn read(self, row: &TxLogRow) -> &str {
        match self {
            Self::Address => &row.address,
            Self::Signature => &row.signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalQuery {
    /// Empty conjunction matches every row.
    And(Vec<PhysicalQuery>),
    /// Empty disjunction matches no row.
    Or(Vec<PhysicalQuery>),
    Not(Box<PhysicalQuery>),
    Arg(ArgPredicate),
    Field { field: RowField, value: String },
}

impl PhysicalQuery {
    pub fn always() -> Self {
        Self::And(Vec::new())
    }

    pub fn never() -> Self {
        Self::Or(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Self::And(parts) if parts.is_empty())
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Self::Or(parts) if parts.is_empty())
    }

    /// Conjunction with nested conjunctions spliced in. A [`Self::never`]
    /// part absorbs the whole conjunction; a single part stands for itself.
    pub fn and(parts: Vec<PhysicalQuery>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                part if part.is_never() => return Self::never(),
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Self::And(flat)
        }
    }

    /// Disjunction with nested disjunctions spliced in. An [`Self::always`]
    /// part absorbs the whole disjunction; no parts at all is
    /// [`Self::never`].
    pub fn or(parts: Vec<PhysicalQuery>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                part if part.is_always() => return Self::always(),
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Self::Or(flat)
        }
    }

    pub fn negate(query: PhysicalQuery) -> Self {
        match query {
            query if query.is_always() => Self::never(),
            query if query.is_never() => Self::always(),
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    fn matches(&self, row: &TxLogRow) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|part| part.matches(row)),
            Self::Or(parts) => parts.iter().any(|part| part.matches(row)),
            Self::Not(inner) => !inner.matches(row),
            Self::Arg(predicate) => predicate.matches(&row.args),
            Self::Field { field, value } => field.read(row).eq_ignore_ascii_case(value),
        }
    }

    /// Render as one clause for a `$and`/`$or` list.
    fn clause(&self) -> Value {
        match self {
            // built by hand; the constructors never nest these
            Self::And(parts) if parts.is_empty() => json!({}),
            Self::Or(parts) if parts.is_empty() => json!({ "$nor": [{}] }),
            Self::And(parts) => json!({ "$and": parts.iter().map(Self::clause).collect::<Vec<_>>() }),
            Self::Or(parts) => json!({ "$or": parts.iter().map(Self::clause).collect::<Vec<_>>() }),
            Self::Not(inner) => match inner.as_ref() {
                Self::Arg(predicate) => {
                    json!({ "args": { "$not": { "$elemMatch": predicate.element_document() } } })
                }
                other => json!({ "$nor": [other.clause()] }),
            },
            Self::Arg(predicate) => json!({ "args": { "$elemMatch": predicate.element_document() } }),
            Self::Field { field, value } => json!({ field.as_str(): value }),
        }
    }
}

/// Compiled query: the predicate scoped to one event signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogQuery {
    pub signature: String,
    pub predicate: PhysicalQuery,
}

impl LogQuery {
    pub fn matches(&self, row: &TxLogRow) -> bool {
        RowField::Signature.read(row).eq_ignore_ascii_case(&self.signature)
            && self.predicate.matches(row)
    }

    /// Document-store syntax. The top level carries the signature clause
    /// next to the compiled predicate.
    pub fn to_document(&self) -> Value {
        let mut document = Map::new();
        document.insert("signature".to_string(), json!(self.signature));
        match &self.predicate {
            PhysicalQuery::And(parts) if parts.is_empty() => {}
            PhysicalQuery::Or(parts) if parts.is_empty() => {
                document.insert("$nor".to_string(), json!([{}]));
            }
            PhysicalQuery::And(parts) => {
                document.insert(
                    "$and".to_string(),
                    Value::Array(parts.iter().map(PhysicalQuery::clause).collect()),
                );
            }
            PhysicalQuery::Or(parts) => {
                document.insert(
                    "$or".to_string(),
                    Value::Array(parts.iter().map(PhysicalQuery::clause).collect()),
                );
            }
            other => {
                document.insert("$and".to_string(), Value::Array(vec![other.clause()]));
            }
        }
        Value::Object(document)
    }
}
