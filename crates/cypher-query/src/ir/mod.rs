//! Intermediate representation of a graph read.

mod clause;
mod pattern;
mod read_only;

pub use clause::{MatchClause, OrderDirection, Ordering, ReadingClause};
pub use pattern::{
    HopRange, NodePattern, Pattern, RelationshipDetail, RelationshipDirection,
    RelationshipPattern,
};
pub use read_only::{ReadOnlyExpression, DEFAULT_ALIAS_PREFIX};
