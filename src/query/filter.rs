//! Logical filters over named event arguments.

use serde_json::{Map, Value};

use super::error::Unsatisfiable;

/// Comparison applied to one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(String),
    Ne(String),
    In(Vec<String>),
    Nin(Vec<String>),
}

/// Caller-facing predicate over a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalFilter {
    Arg { name: String, condition: Condition },
    And(Vec<LogicalFilter>),
    Or(Vec<LogicalFilter>),
    Not(Box<LogicalFilter>),
    /// Emitting contract of the log.
    Address(String),
}

impl LogicalFilter {
    /// Matches every log of the event.
    pub fn any() -> Self {
        Self::And(Vec::new())
    }

    pub fn eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::arg(name, Condition::Eq(value.into()))
    }

    pub fn ne(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::arg(name, Condition::Ne(value.into()))
    }

    pub fn is_in<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::arg(name, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::arg(name, Condition::Nin(values.into_iter().map(Into::into).collect()))
    }

    pub fn arg(name: impl Into<String>, condition: Condition) -> Self {
        Self::Arg {
            name: name.into(),
            condition,
        }
    }

    /// `from` or `to` equal to `address`, as a transfer touching the account.
    pub fn touching(address: &str) -> Self {
        Self::Or(vec![Self::eq("to", address), Self::eq("from", address)])
    }

    /// Parse the document syntax:
    ///
    /// ```text
    /// {"to": "0xab"}
    /// {"to": {"$in": ["0xab", "0xcd"]}, "from": {"$ne": "0x01"}}
    /// {"$or": [{"to": "0xab"}, {"from": "0xab"}]}
    /// ```
    ///
    /// Several keys in one document form a conjunction. `address` is the
    /// emitting contract, every other plain key names an event argument.
    pub fn from_document(document: &Value) -> Result<Self, Unsatisfiable> {
        let object = document
            .as_object()
            .ok_or_else(|| malformed("filter must be an object"))?;
        let mut clauses = parse_object(object)?;
        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Self::And(clauses))
        }
    }
}

fn parse_object(object: &Map<String, Value>) -> Result<Vec<LogicalFilter>, Unsatisfiable> {
    object
        .iter()
        .map(|(key, value)| match key.as_str() {
            "$or" => Ok(LogicalFilter::Or(parse_list(key, value)?)),
            "$and" => Ok(LogicalFilter::And(parse_list(key, value)?)),
            "$nor" => Ok(LogicalFilter::Not(Box::new(LogicalFilter::Or(parse_list(
                key, value,
            )?)))),
            "$not" => Ok(LogicalFilter::Not(Box::new(LogicalFilter::from_document(
                value,
            )?))),
            "address" => Ok(LogicalFilter::Address(scalar(key, value)?)),
            other if other.starts_with('$') => {
                Err(malformed(format!("unsupported operator '{other}'")))
            }
            name => parse_argument(name, value),
        })
        .collect()
}

fn parse_list(key: &str, value: &Value) -> Result<Vec<LogicalFilter>, Unsatisfiable> {
    value
        .as_array()
        .ok_or_else(|| malformed(format!("'{key}' expects an array")))?
        .iter()
        .map(LogicalFilter::from_document)
        .collect()
}

fn parse_argument(name: &str, value: &Value) -> Result<LogicalFilter, Unsatisfiable> {
    let operators = match value {
        Value::Object(operators) => operators,
        _ => return Ok(LogicalFilter::eq(name, scalar(name, value)?)),
    };

    let mut conditions = operators
        .iter()
        .map(|(op, operand)| {
            let condition = match op.as_str() {
                "$eq" => Condition::Eq(scalar(name, operand)?),
                "$ne" => Condition::Ne(scalar(name, operand)?),
                "$in" => Condition::In(scalars(name, operand)?),
                "$nin" => Condition::Nin(scalars(name, operand)?),
                other => {
                    return Err(malformed(format!(
                        "unsupported operator '{other}' on '{name}'"
                    )))
                }
            };
            Ok(LogicalFilter::arg(name, condition))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match conditions.len() {
        0 => Err(malformed(format!("no condition for '{name}'"))),
        1 => Ok(conditions.remove(0)),
        _ => Ok(LogicalFilter::And(conditions)),
    }
}

fn scalar(name: &str, value: &Value) -> Result<String, Unsatisfiable> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Unsatisfiable::MalformedValue {
            argument: name.to_string(),
            value: value.to_string(),
        })
}

fn scalars(name: &str, value: &Value) -> Result<Vec<String>, Unsatisfiable> {
    value
        .as_array()
        .ok_or_else(|| malformed(format!("'{name}' expects an array of values")))?
        .iter()
        .map(|item| scalar(name, item))
        .collect()
}

fn malformed(reason: impl Into<String>) -> Unsatisfiable {
    Unsatisfiable::MalformedFilter(reason.into())
}
