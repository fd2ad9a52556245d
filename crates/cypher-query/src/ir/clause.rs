//! Reading clauses and ordering terms of a read.

use super::pattern::{NodePattern, Pattern};
use super::read_only::ReadOnlyExpression;
use crate::expr::{Expr, SourceId};
use std::sync::Arc;

/// `[OPTIONAL] MATCH pattern [WHERE predicate]`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub pattern: Pattern,
    pub predicate: Option<Expr>,
    pub optional: bool,
    /// Data source whose items this clause produces
    pub source: Option<SourceId>,
}

impl MatchClause {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            predicate: None,
            optional: false,
            source: None,
        }
    }

    pub fn for_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Conjoin `predicate` with any existing predicate.
    pub fn add_to_where(&mut self, predicate: Expr) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Expr::and_also(existing, predicate),
            None => predicate,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadingClause {
    Match(MatchClause),
    /// A read nested as a clause of another read
    Read {
        source: Option<SourceId>,
        query: Box<ReadOnlyExpression>,
    },
}

impl ReadingClause {
    pub fn source(&self) -> Option<SourceId> {
        match self {
            ReadingClause::Match(clause) => clause.source,
            ReadingClause::Read { source, .. } => *source,
        }
    }

    /// Node this clause contributes for its source. Nested reads have none.
    pub fn node(&self) -> Option<&Arc<NodePattern>> {
        match self {
            ReadingClause::Match(clause) => Some(clause.pattern.terminal_node()),
            ReadingClause::Read { .. } => None,
        }
    }
}

impl From<MatchClause> for ReadingClause {
    fn from(clause: MatchClause) -> Self {
        ReadingClause::Match(clause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expr: Expr,
    pub direction: OrderDirection,
}

impl Ordering {
    pub fn ascending(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Ascending,
        }
    }

    pub fn descending(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Descending,
        }
    }
}
