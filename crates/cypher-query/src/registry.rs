//! Source registry: which read each data source lives in.
//!
//! Built in one pass over the query model before any binding happens.
//! After that the source-to-read map is fixed; binding only mutates the
//! contents of the reads.

use crate::error::{CompileError, CompileResult};
use crate::expr::SourceId;
use crate::ir::{
    MatchClause, NodePattern, Pattern, ReadOnlyExpression, RelationshipDetail,
    RelationshipPattern,
};
use crate::metadata::Model;
use crate::model::{BodyClause, JoinClause, QueryModel, QuerySource, SourceKind};
use crate::types::ValueType;
use std::collections::HashMap;
use tracing::debug;

/// Index of a read owned by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(usize);

/// How a source entered the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    Main,
    AdditionalFrom,
    Join,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSource {
    pub query: QueryId,
    pub role: SourceRole,
    pub item_name: String,
    pub item_type: ValueType,
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    queries: Vec<ReadOnlyExpression>,
    sources: HashMap<SourceId, RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for `model`, returning it with the main read.
    pub fn build(
        model: &QueryModel,
        schema: &Model,
        alias_prefix: &str,
    ) -> CompileResult<(Self, QueryId)> {
        let mut registry = Self::new();

        let main_query =
            registry.add_query(ReadOnlyExpression::new().with_alias_prefix(alias_prefix));
        registry.add_entity_match(main_query, &model.main_from, SourceRole::Main, schema)?;

        for clause in &model.body_clauses {
            match clause {
                BodyClause::AdditionalFrom(source) => {
                    registry.add_entity_match(
                        main_query,
                        source,
                        SourceRole::AdditionalFrom,
                        schema,
                    )?;
                }
                BodyClause::Join(join) => registry.add_join(main_query, join, schema)?,
                BodyClause::Where(_)
                | BodyClause::OrderBy(_)
                | BodyClause::Take(_)
                | BodyClause::Skip(_) => {}
            }
        }

        Ok((registry, main_query))
    }

    pub fn add_query(&mut self, query: ReadOnlyExpression) -> QueryId {
        self.queries.push(query);
        QueryId(self.queries.len() - 1)
    }

    pub fn register(&mut self, source: SourceId, registered: RegisteredSource) {
        debug!(
            source = %source,
            item = %registered.item_name,
            role = ?registered.role,
            "registered source"
        );
        self.sources.insert(source, registered);
    }

    /// Read that owns `source`, if any. Never creates one.
    pub fn try_get_query(&self, source: SourceId) -> Option<QueryId> {
        self.sources.get(&source).map(|registered| registered.query)
    }

    pub fn source(&self, source: SourceId) -> Option<&RegisteredSource> {
        self.sources.get(&source)
    }

    pub fn is_join_source(&self, source: SourceId) -> bool {
        matches!(
            self.sources.get(&source),
            Some(RegisteredSource {
                role: SourceRole::Join,
                ..
            })
        )
    }

    pub fn query(&self, id: QueryId) -> Option<&ReadOnlyExpression> {
        self.queries.get(id.0)
    }

    pub fn query_mut(&mut self, id: QueryId) -> Option<&mut ReadOnlyExpression> {
        self.queries.get_mut(id.0)
    }

    /// Consume the registry, keeping one finished read.
    pub fn into_query(mut self, id: QueryId) -> Option<ReadOnlyExpression> {
        if id.0 < self.queries.len() {
            Some(self.queries.swap_remove(id.0))
        } else {
            None
        }
    }

    fn add_entity_match(
        &mut self,
        query: QueryId,
        source: &QuerySource,
        role: SourceRole,
        schema: &Model,
    ) -> CompileResult<()> {
        let node = entity_node(source, schema)?;
        let clause = MatchClause::new(Pattern::new(node.shared())).for_source(source.id);

        self.query_mut(query)
            .ok_or(CompileError::UnknownSource {
                source_id: source.id,
            })?
            .add_reading_clause(clause);

        self.register(
            source.id,
            RegisteredSource {
                query,
                role,
                item_name: source.item_name.clone(),
                item_type: source.item_type(),
            },
        );
        Ok(())
    }

    fn add_join(&mut self, query: QueryId, join: &JoinClause, schema: &Model) -> CompileResult<()> {
        let Some(relationship) = &join.relationship else {
            // Key joins bind their predicate later
            return self.add_entity_match(query, &join.source, SourceRole::Join, schema);
        };

        let outer = self
            .source(join.outer)
            .ok_or(CompileError::UnknownSource {
                source_id: join.outer,
            })?;
        let outer_node = NodePattern::new(outer.item_name.clone()).shared();
        let inner_node = entity_node(&join.source, schema)?.shared();

        let step = RelationshipPattern::new(relationship.direction).with_detail(
            RelationshipDetail {
                alias: relationship.alias.clone(),
                kinds: relationship.kinds.clone(),
                range: relationship.range,
            },
        );
        let clause = MatchClause::new(Pattern::new(outer_node).then(step, inner_node))
            .for_source(join.source.id);

        self.query_mut(query)
            .ok_or(CompileError::UnknownSource {
                source_id: join.source.id,
            })?
            .add_reading_clause(clause);

        self.register(
            join.source.id,
            RegisteredSource {
                query,
                role: SourceRole::Join,
                item_name: join.source.item_name.clone(),
                item_type: join.source.item_type(),
            },
        );
        Ok(())
    }
}

fn entity_node(source: &QuerySource, schema: &Model) -> CompileResult<NodePattern> {
    match &source.kind {
        SourceKind::EntitySet { entity } => {
            let entity = schema
                .find_entity(entity)
                .ok_or_else(|| CompileError::UnknownEntity {
                    name: entity.clone(),
                })?;
            Ok(NodePattern::new(source.item_name.clone()).with_labels(entity.labels.iter().cloned()))
        }
        SourceKind::SubQuery(_) => Err(CompileError::Unsupported(format!(
            "source '{}' wraps a nested query",
            source.item_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ReadingClause, RelationshipDirection};
    use crate::metadata::Property;
    use crate::model::RelationshipSpec;

    fn schema() -> Model {
        Model::builder()
            .entity("Warehouse")
            .key(Property::new("Id", ValueType::Int64))
            .done()
            .entity("Thing")
            .key(Property::new("Id", ValueType::Int64))
            .done()
            .build()
    }

    #[test]
    fn test_main_source_gets_labelled_match() {
        let model = QueryModel::from_source(QuerySource::entity(0, "w", "Warehouse"));
        let (registry, main) = SourceRegistry::build(&model, &schema(), "s").unwrap();

        assert_eq!(registry.try_get_query(SourceId(0)), Some(main));
        let node = registry
            .query(main)
            .unwrap()
            .node_for_source(SourceId(0))
            .unwrap();
        assert_eq!(node.alias.as_deref(), Some("w"));
        assert_eq!(node.labels, vec!["Warehouse".to_string()]);
    }

    #[test]
    fn test_unregistered_source_is_absent() {
        let model = QueryModel::from_source(QuerySource::entity(0, "w", "Warehouse"));
        let (registry, _) = SourceRegistry::build(&model, &schema(), "s").unwrap();

        assert!(registry.try_get_query(SourceId(9)).is_none());
        assert!(registry.source(SourceId(9)).is_none());
    }

    #[test]
    fn test_join_along_relationship() {
        let warehouses = QuerySource::entity(0, "o", "Warehouse");
        let things = QuerySource::entity(1, "i", "Thing");
        let model = QueryModel::from_source(warehouses.clone()).with_join(JoinClause::related(
            things,
            warehouses.id,
            RelationshipSpec::new(RelationshipDirection::Right)
                .with_alias("r")
                .with_kind("OWNS"),
        ));

        let (registry, main) = SourceRegistry::build(&model, &schema(), "s").unwrap();
        let read = registry.query(main).unwrap();

        assert_eq!(read.reading_clauses().len(), 2);
        assert!(registry.is_join_source(SourceId(1)));
        assert!(!registry.is_join_source(SourceId(0)));

        let ReadingClause::Match(clause) = &read.reading_clauses()[1] else {
            panic!("expected match clause");
        };
        assert_eq!(clause.pattern.start.alias.as_deref(), Some("o"));
        assert!(clause.pattern.start.labels.is_empty());
        assert_eq!(clause.pattern.terminal_node().alias.as_deref(), Some("i"));
    }

    #[test]
    fn test_unknown_entity() {
        let model = QueryModel::from_source(QuerySource::entity(0, "x", "Missing"));
        let err = SourceRegistry::build(&model, &schema(), "s").unwrap_err();

        assert_eq!(
            err,
            CompileError::UnknownEntity {
                name: "Missing".to_string()
            }
        );
    }

    #[test]
    fn test_nested_query_source_is_unsupported() {
        let inner = QueryModel::from_source(QuerySource::entity(0, "w", "Warehouse"));
        let model = QueryModel::from_source(QuerySource::sub_query(1, "x", inner));

        assert!(matches!(
            SourceRegistry::build(&model, &schema(), "s"),
            Err(CompileError::Unsupported(_))
        ));
    }
}
