//! Generic query model handed over by the object-query front end.
//!
//! A model is a main source, a list of body clauses and a selector. The
//! front end has already parsed user syntax; nothing here is textual.

use crate::expr::{Expr, MemberRef, SourceId};
use crate::ir::{HopRange, Ordering, RelationshipDirection};
use crate::types::ValueType;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// All nodes of a mapped entity
    EntitySet { entity: String },
    /// Items produced by another query model
    SubQuery(Box<QueryModel>),
}

/// A named data source: `from w in warehouses`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySource {
    pub id: SourceId,
    pub item_name: String,
    pub kind: SourceKind,
}

impl QuerySource {
    pub fn entity(id: u32, item_name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            id: SourceId(id),
            item_name: item_name.into(),
            kind: SourceKind::EntitySet {
                entity: entity.into(),
            },
        }
    }

    pub fn sub_query(id: u32, item_name: impl Into<String>, model: QueryModel) -> Self {
        Self {
            id: SourceId(id),
            item_name: item_name.into(),
            kind: SourceKind::SubQuery(Box::new(model)),
        }
    }

    pub fn item_type(&self) -> ValueType {
        match &self.kind {
            SourceKind::EntitySet { entity } => ValueType::Entity(entity.clone()),
            SourceKind::SubQuery(_) => ValueType::Object,
        }
    }

    /// Reference to the current item of this source.
    pub fn reference(&self) -> Expr {
        Expr::source(self.id, self.item_type())
    }

    /// Member access on the current item, e.g. `w.Location`.
    pub fn member(&self, name: impl Into<String>, value_type: ValueType) -> Expr {
        let owner = match &self.kind {
            SourceKind::EntitySet { entity } => entity.clone(),
            SourceKind::SubQuery(_) => self.item_name.clone(),
        };
        Expr::member(self.reference(), MemberRef::new(owner, name, value_type))
    }
}

/// Relationship traversed by a join, `-[r:"OWNS"]->`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationshipSpec {
    pub alias: Option<String>,
    pub kinds: Vec<String>,
    pub direction: RelationshipDirection,
    pub range: Option<HopRange>,
}

impl RelationshipSpec {
    pub fn new(direction: RelationshipDirection) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    pub fn with_range(mut self, range: HopRange) -> Self {
        self.range = Some(range);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub source: QuerySource,
    /// Source the join starts from
    pub outer: SourceId,
    pub relationship: Option<RelationshipSpec>,
    pub outer_key: Option<Expr>,
    pub inner_key: Option<Expr>,
}

impl JoinClause {
    /// Join along a relationship from `outer`.
    pub fn related(source: QuerySource, outer: SourceId, relationship: RelationshipSpec) -> Self {
        Self {
            source,
            outer,
            relationship: Some(relationship),
            outer_key: None,
            inner_key: None,
        }
    }

    /// Join on `outer_key == inner_key`.
    pub fn keyed(source: QuerySource, outer: SourceId, outer_key: Expr, inner_key: Expr) -> Self {
        Self {
            source,
            outer,
            relationship: None,
            outer_key: Some(outer_key),
            inner_key: Some(inner_key),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyClause {
    Where(Expr),
    AdditionalFrom(QuerySource),
    Join(JoinClause),
    OrderBy(Vec<Ordering>),
    Take(Expr),
    Skip(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    pub main_from: QuerySource,
    pub body_clauses: Vec<BodyClause>,
    pub selector: Expr,
}

impl QueryModel {
    /// `from <source> select <source>`
    pub fn from_source(main_from: QuerySource) -> Self {
        let selector = main_from.reference();
        Self {
            main_from,
            body_clauses: Vec::new(),
            selector,
        }
    }

    pub fn with_clause(mut self, clause: BodyClause) -> Self {
        self.body_clauses.push(clause);
        self
    }

    pub fn with_where(self, predicate: Expr) -> Self {
        self.with_clause(BodyClause::Where(predicate))
    }

    pub fn with_join(self, join: JoinClause) -> Self {
        self.with_clause(BodyClause::Join(join))
    }

    pub fn with_additional_from(self, source: QuerySource) -> Self {
        self.with_clause(BodyClause::AdditionalFrom(source))
    }

    pub fn with_order_by(self, orderings: Vec<Ordering>) -> Self {
        self.with_clause(BodyClause::OrderBy(orderings))
    }

    pub fn with_take(self, count: Expr) -> Self {
        self.with_clause(BodyClause::Take(count))
    }

    pub fn with_skip(self, count: Expr) -> Self {
        self.with_clause(BodyClause::Skip(count))
    }

    pub fn select(mut self, selector: Expr) -> Self {
        self.selector = selector;
        self
    }

    /// Every source introduced by this model, main source first.
    pub fn sources(&self) -> impl Iterator<Item = &QuerySource> {
        std::iter::once(&self.main_from).chain(self.body_clauses.iter().filter_map(
            |clause| match clause {
                BodyClause::AdditionalFrom(source) => Some(source),
                BodyClause::Join(join) => Some(&join.source),
                _ => None,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selector_is_main_source() {
        let warehouses = QuerySource::entity(0, "w", "Warehouse");
        let model = QueryModel::from_source(warehouses.clone());

        assert_eq!(model.selector, warehouses.reference());
        assert_eq!(
            model.selector.value_type(),
            ValueType::Entity("Warehouse".into())
        );
    }

    #[test]
    fn test_sources_in_declaration_order() {
        let warehouses = QuerySource::entity(0, "o", "Warehouse");
        let things = QuerySource::entity(1, "i", "Thing");
        let model = QueryModel::from_source(warehouses.clone())
            .with_where(Expr::constant(true))
            .with_join(JoinClause::related(
                things,
                warehouses.id,
                RelationshipSpec::new(RelationshipDirection::Right).with_kind("OWNS"),
            ));

        let names: Vec<_> = model.sources().map(|s| s.item_name.as_str()).collect();
        assert_eq!(names, vec!["o", "i"]);
    }

    #[test]
    fn test_member_owner_is_entity() {
        let warehouses = QuerySource::entity(0, "w", "Warehouse");
        let Expr::Member { member, .. } = warehouses.member("Size", ValueType::Int32) else {
            panic!("expected member access");
        };

        assert_eq!(member.owner, "Warehouse");
        assert_eq!(member.value_type, ValueType::Int32);
    }
}
