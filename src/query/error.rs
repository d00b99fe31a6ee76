use thiserror::Error;

/// No physical query can represent the logical filter.
///
/// Callers must treat this as "matches nothing" and never fall back to a
/// broader query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unsatisfiable {
    #[error("Unknown event argument '{0}'")]
    UnknownArgument(String),
    #[error("Value '{value}' for argument '{argument}' is not a hex scalar")]
    MalformedValue { argument: String, value: String },
    #[error("Malformed filter: {0}")]
    MalformedFilter(String),
    /// The filter reduces to an empty disjunction, e.g. `{"to": {"$in": []}}`.
    #[error("Filter matches no row")]
    MatchesNothing,
}
