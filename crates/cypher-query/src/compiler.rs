//! Query compiler: query model in, Cypher text and parameters out.
//!
//! Compilation runs in two passes. The registry pass fixes which read
//! and clause every source maps to. The binding pass then translates
//! body clauses and the selector against those reads. Whatever the binder
//! cannot translate is reported as a client fragment rather than failing
//! the query.

use crate::binder::{Binder, NoOuterQuery, OuterQueryBinder};
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, MemberKey, SourceId};
use crate::ir::{Ordering, ReadOnlyExpression};
use crate::metadata::{Model, PropertyRef};
use crate::model::{BodyClause, JoinClause, QueryModel};
use crate::registry::{QueryId, SourceRegistry};
use crate::render::{CypherGenerator, QueryRenderer};
use crate::storage::{DefaultTypeMapper, TypeMapper};
use crate::transform::{QueryTransform, ValidateTransform};
use crate::types::ValueType;
use cypher_config::CompilerConfig;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Where a client-side fragment came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    Predicate,
    JoinCondition,
    Ordering,
    Limit,
    Skip,
    Projection,
    /// One member of an object projection
    ProjectionMember(String),
}

/// Part of the query the client evaluates after the rows come back.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFragment {
    pub kind: FragmentKind,
    pub description: String,
    pub expr: Expr,
}

impl ClientFragment {
    fn new(kind: FragmentKind, expr: &Expr) -> Self {
        let description = match &kind {
            FragmentKind::ProjectionMember(member) => {
                format!("{} in projection member '{}'", expr.kind(), member)
            }
            other => format!("{} in {:?}", expr.kind(), other).to_lowercase(),
        };
        Self {
            kind,
            description,
            expr: expr.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub text: String,
    pub parameters: HashMap<String, JsonValue>,
    /// Semantic type of each returned column
    pub return_types: Vec<ValueType>,
    pub client_fragments: Vec<ClientFragment>,
}

impl CompiledQuery {
    /// Whether the whole query runs server-side.
    pub fn is_fully_translated(&self) -> bool {
        self.client_fragments.is_empty()
    }
}

pub struct QueryCompiler {
    schema: Model,
    config: CompilerConfig,
    type_mapper: Arc<dyn TypeMapper>,
    outer: Box<dyn OuterQueryBinder + Send + Sync>,
    transforms: Vec<Box<dyn QueryTransform>>,
    parameter_values: HashMap<String, JsonValue>,
}

impl QueryCompiler {
    pub fn new(schema: Model) -> Self {
        Self {
            schema,
            config: CompilerConfig::default(),
            type_mapper: Arc::new(DefaultTypeMapper),
            outer: Box::new(NoOuterQuery),
            transforms: vec![Box::new(ValidateTransform)],
            parameter_values: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_type_mapper(mut self, type_mapper: Arc<dyn TypeMapper>) -> Self {
        self.type_mapper = type_mapper;
        self
    }

    /// Correlation binder for members of an enclosing query
    pub fn with_outer_binder(mut self, outer: Box<dyn OuterQueryBinder + Send + Sync>) -> Self {
        self.outer = outer;
        self
    }

    /// Run an extra pass after validation
    pub fn with_transform(mut self, transform: Box<dyn QueryTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Values for parameters produced by the outer binder
    pub fn with_parameter_values(mut self, values: HashMap<String, JsonValue>) -> Self {
        self.parameter_values = values;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(&self, model: &QueryModel) -> CompileResult<CompiledQuery> {
        self.config
            .validate()
            .map_err(|err| CompileError::InvalidConfig(err.to_string()))?;

        let (mut registry, main) = SourceRegistry::build(
            model,
            &self.schema,
            &self.config.binding.default_alias_prefix,
        )?;

        let mut state = BindState::default();
        for clause in &model.body_clauses {
            self.bind_body_clause(&mut registry, main, clause, &mut state)?;
        }
        self.bind_selector(&mut registry, main, &model.selector, &mut state)?;

        let mut read = registry.into_query(main).ok_or(CompileError::UnknownSource {
            source_id: model.main_from.id,
        })?;
        if state.needs_entity {
            let main_node = read
                .node_for_source(model.main_from.id)
                .cloned()
                .ok_or(CompileError::UnknownSource {
                    source_id: model.main_from.id,
                })?;
            read.set_return_star_node(main_node);
            read.set_return_star(true);
        }

        for transform in &self.transforms {
            debug!(transform = transform.name(), "running transform");
            read = transform.transform(read)?;
        }

        let return_types = read.return_types();
        let rendered = CypherGenerator::new(self.config.generation.clone())
            .with_type_mapper(Arc::clone(&self.type_mapper))
            .with_parameter_values(self.parameter_values.clone())
            .render(&read)?;

        debug!(
            fragments = state.fragments.len(),
            parameters = rendered.params.len(),
            "compiled query"
        );

        Ok(CompiledQuery {
            text: rendered.text,
            parameters: rendered.params,
            return_types,
            client_fragments: state.fragments,
        })
    }

    fn binder<'a>(&'a self, registry: &'a mut SourceRegistry, main: QueryId) -> Binder<'a> {
        Binder::new(registry, &self.schema, self.type_mapper.as_ref())
            .with_target(main)
            .with_outer_binder(self.outer.as_ref())
    }

    // ------------------------------------------------------------------
    // Body clauses
    // ------------------------------------------------------------------

    fn bind_body_clause(
        &self,
        registry: &mut SourceRegistry,
        main: QueryId,
        clause: &BodyClause,
        state: &mut BindState,
    ) -> CompileResult<()> {
        match clause {
            BodyClause::Where(predicate) => {
                self.bind_predicate(registry, main, predicate, FragmentKind::Predicate, state)
            }
            BodyClause::Join(JoinClause {
                relationship: None,
                outer_key: Some(outer_key),
                inner_key: Some(inner_key),
                ..
            }) => {
                let condition = Expr::equal(outer_key.clone(), inner_key.clone());
                self.bind_predicate(registry, main, &condition, FragmentKind::JoinCondition, state)
            }
            BodyClause::Join(JoinClause {
                relationship: None,
                source,
                ..
            }) => Err(CompileError::Unsupported(format!(
                "join of '{}' has neither a relationship nor key selectors",
                source.item_name
            ))),
            BodyClause::Join(_) | BodyClause::AdditionalFrom(_) => Ok(()),
            BodyClause::OrderBy(orderings) => {
                for ordering in orderings {
                    self.bind_ordering(registry, main, ordering, state)?;
                }
                Ok(())
            }
            BodyClause::Take(count) => {
                if state.rows_filtered_client_side {
                    state.push(FragmentKind::Limit, count);
                    return Ok(());
                }
                let bound = self.binder(registry, main).translate_predicate(count);
                match bound {
                    Some(limit) => {
                        read_mut(registry, main)?.set_limit(Some(limit));
                        state.limited = true;
                    }
                    None => state.push_row_fragment(FragmentKind::Limit, count),
                }
                Ok(())
            }
            BodyClause::Skip(count) => {
                // SKIP renders before LIMIT, so a skip after a take stays client-side
                if state.rows_filtered_client_side || state.limited {
                    state.rows_filtered_client_side = true;
                    state.push(FragmentKind::Skip, count);
                    return Ok(());
                }
                let bound = self.binder(registry, main).translate_predicate(count);
                match bound {
                    Some(skip) => read_mut(registry, main)?.set_skip(Some(skip)),
                    None => state.push_row_fragment(FragmentKind::Skip, count),
                }
                Ok(())
            }
        }
    }

    fn bind_predicate(
        &self,
        registry: &mut SourceRegistry,
        main: QueryId,
        predicate: &Expr,
        kind: FragmentKind,
        state: &mut BindState,
    ) -> CompileResult<()> {
        if state.limited {
            // Filtering after a limit cannot move before it
            state.push_row_fragment(kind, predicate);
            return Ok(());
        }

        let bound = self.binder(registry, main).translate_predicate(predicate);
        match bound {
            Some(bound) => {
                let clause = read_mut(registry, main)?.last_match_mut().ok_or_else(|| {
                    CompileError::Unsupported("predicate without a match clause".to_string())
                })?;
                clause.add_to_where(bound);
            }
            None => state.push_row_fragment(kind, predicate),
        }
        Ok(())
    }

    fn bind_ordering(
        &self,
        registry: &mut SourceRegistry,
        main: QueryId,
        ordering: &Ordering,
        state: &mut BindState,
    ) -> CompileResult<()> {
        if state.rows_filtered_client_side || state.limited {
            state.push(FragmentKind::Ordering, &ordering.expr);
            return Ok(());
        }

        let bound = self.binder(registry, main).translate_predicate(&ordering.expr);
        match bound {
            Some(bound) => read_mut(registry, main)?.add_ordering(Ordering {
                expr: bound,
                direction: ordering.direction,
            }),
            None => state.push_row_fragment(FragmentKind::Ordering, &ordering.expr),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Selector
    // ------------------------------------------------------------------

    fn bind_selector(
        &self,
        registry: &mut SourceRegistry,
        main: QueryId,
        selector: &Expr,
        state: &mut BindState,
    ) -> CompileResult<()> {
        match selector {
            Expr::SourceRef { source, value_type } => {
                self.bind_entity_selector(registry, *source, value_type, selector, state)
            }
            Expr::New { type_name, members } => {
                for (name, member) in members {
                    let is_constant = matches!(member.remove_convert(), Expr::Constant { .. });
                    if is_constant && !self.config.binding.project_constants {
                        state.push(FragmentKind::ProjectionMember(name.clone()), member);
                        continue;
                    }

                    let bound = self.binder(registry, main).translate_projection(member);
                    match bound {
                        Some(bound) => {
                            let read = read_mut(registry, main)?;
                            let index = read.add_return_item(bound, true);
                            let item = read.return_items()[index].clone();
                            read.set_return_for_member(MemberKey::new(type_name.clone(), name.clone()), item);
                        }
                        None => {
                            state.needs_entity = true;
                            state.push(FragmentKind::ProjectionMember(name.clone()), member);
                        }
                    }
                }
                Ok(())
            }
            other => {
                let bound = self.binder(registry, main).translate_projection(other);
                match bound {
                    Some(bound) => {
                        read_mut(registry, main)?.add_return_item(bound, true);
                    }
                    None => {
                        state.needs_entity = true;
                        state.push(FragmentKind::Projection, other);
                    }
                }
                Ok(())
            }
        }
    }

    /// `select w` returns every property of the entity, in declaration order.
    fn bind_entity_selector(
        &self,
        registry: &mut SourceRegistry,
        source: SourceId,
        value_type: &ValueType,
        selector: &Expr,
        state: &mut BindState,
    ) -> CompileResult<()> {
        let query = registry
            .try_get_query(source)
            .ok_or(CompileError::UnknownSource { source_id: source })?;

        let Some(entity) = self.schema.entity_for_type(value_type) else {
            state.needs_entity = true;
            state.push(FragmentKind::Projection, selector);
            return Ok(());
        };

        let read = read_mut(registry, query)?;
        for property in entity.properties() {
            let property = PropertyRef {
                entity: entity.name.clone(),
                property: property.clone(),
            };
            if let Some(bound) = read.bind_property(&property, source) {
                read.add_return_item(bound, true);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BindState {
    fragments: Vec<ClientFragment>,
    /// Rows are filtered or ordered by the client, so paging must be too
    rows_filtered_client_side: bool,
    /// A server-side limit is already in place
    limited: bool,
    /// The client needs whole entities to evaluate its fragments
    needs_entity: bool,
}

impl BindState {
    fn push(&mut self, kind: FragmentKind, expr: &Expr) {
        let fragment = ClientFragment::new(kind, expr);
        debug!(description = %fragment.description, "evaluating fragment client-side");
        self.fragments.push(fragment);
    }

    fn push_row_fragment(&mut self, kind: FragmentKind, expr: &Expr) {
        self.rows_filtered_client_side = true;
        self.needs_entity = true;
        self.push(kind, expr);
    }
}

fn read_mut(registry: &mut SourceRegistry, id: QueryId) -> CompileResult<&mut ReadOnlyExpression> {
    registry
        .query_mut(id)
        .ok_or_else(|| CompileError::Unsupported("read is no longer registered".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::metadata::Property;
    use crate::model::QuerySource;

    fn schema() -> Model {
        Model::builder()
            .entity("Warehouse")
            .property(Property::new("Location", ValueType::String))
            .property(Property::new("Size", ValueType::Int32))
            .done()
            .build()
    }

    fn warehouses() -> QuerySource {
        QuerySource::entity(0, "w", "Warehouse")
    }

    fn compile(model: &QueryModel) -> CompiledQuery {
        QueryCompiler::new(schema()).compile(model).unwrap()
    }

    fn method_call() -> Expr {
        Expr::MethodCall {
            target: Some(Box::new(warehouses().member("Location", ValueType::String))),
            method: "StartsWith".into(),
            arguments: vec![Expr::constant("O")],
            value_type: ValueType::Bool,
        }
    }

    #[test]
    fn test_untranslatable_predicate_returns_entity() {
        let model = QueryModel::from_source(warehouses())
            .with_where(method_call())
            .select(warehouses().member("Size", ValueType::Int32));

        let compiled = compile(&model);

        assert_eq!(compiled.text, "MATCH (w:Warehouse) RETURN \"w\".*, \"w\".\"Size\"");
        assert_eq!(compiled.client_fragments.len(), 1);
        assert_eq!(compiled.client_fragments[0].kind, FragmentKind::Predicate);
        assert!(!compiled.is_fully_translated());
    }

    #[test]
    fn test_take_after_client_filter_stays_client_side() {
        let model = QueryModel::from_source(warehouses())
            .with_where(method_call())
            .with_take(Expr::constant(5));

        let compiled = compile(&model);

        assert!(!compiled.text.contains("LIMIT"));
        let kinds: Vec<_> = compiled.client_fragments.iter().map(|f| f.kind.clone()).collect();
        assert_eq!(kinds, vec![FragmentKind::Predicate, FragmentKind::Limit]);
    }

    #[test]
    fn test_skip_after_take_stays_client_side() {
        let model = QueryModel::from_source(warehouses())
            .with_take(Expr::constant(10))
            .with_skip(Expr::constant(2));

        let compiled = compile(&model);

        assert!(compiled.text.ends_with(" LIMIT 10"));
        assert!(!compiled.text.contains("SKIP"));
        assert_eq!(compiled.client_fragments[0].kind, FragmentKind::Skip);
    }

    #[test]
    fn test_filter_after_take_stays_client_side() {
        let model = QueryModel::from_source(warehouses())
            .with_take(Expr::constant(5))
            .with_where(Expr::equal(
                warehouses().member("Size", ValueType::Int32),
                Expr::constant(1),
            ));

        let compiled = compile(&model);

        assert!(!compiled.text.contains("WHERE"));
        assert!(compiled.text.starts_with("MATCH (w:Warehouse) RETURN \"w\".*"));
        assert!(compiled.text.ends_with(" LIMIT 5"));
        assert_eq!(compiled.client_fragments.len(), 1);
        assert_eq!(compiled.client_fragments[0].kind, FragmentKind::Predicate);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = CompilerConfig::default();
        config.generation.parameter_prefix = String::new();

        let result = QueryCompiler::new(schema())
            .with_config(config)
            .compile(&QueryModel::from_source(warehouses()));

        assert!(matches!(result, Err(CompileError::InvalidConfig(_))));
    }

    #[test]
    fn test_order_skip_take() {
        let size = warehouses().member("Size", ValueType::Int32);
        let model = QueryModel::from_source(warehouses())
            .with_order_by(vec![Ordering::descending(size.clone())])
            .with_skip(Expr::constant(20))
            .with_take(Expr::constant(10))
            .select(size);

        assert_eq!(
            compile(&model).text,
            "MATCH (w:Warehouse) RETURN \"w\".\"Size\" ORDER BY \"w\".\"Size\" DESC SKIP 20 LIMIT 10"
        );
    }

    #[test]
    fn test_constant_members_stay_client_side() {
        let model = QueryModel::from_source(warehouses()).select(Expr::new_object(
            "Summary",
            vec![
                ("Place".to_string(), warehouses().member("Location", ValueType::String)),
                ("Status".to_string(), Expr::constant(1)),
            ],
        ));

        let compiled = compile(&model);

        assert_eq!(compiled.text, "MATCH (w:Warehouse) RETURN \"w\".\"Location\" AS \"Place\"");
        assert_eq!(
            compiled.client_fragments[0].kind,
            FragmentKind::ProjectionMember("Status".to_string())
        );
    }

    #[test]
    fn test_project_constants_when_configured() {
        let mut config = CompilerConfig::default();
        config.binding.project_constants = true;

        let model = QueryModel::from_source(warehouses()).select(Expr::new_object(
            "Summary",
            vec![("Status".to_string(), Expr::constant(1))],
        ));

        let compiled = QueryCompiler::new(schema())
            .with_config(config)
            .compile(&model)
            .unwrap();

        assert_eq!(compiled.text, "MATCH (w:Warehouse) RETURN 1 AS \"Status\"");
        assert!(compiled.is_fully_translated());
    }

    #[test]
    fn test_return_types_follow_items() {
        let model = QueryModel::from_source(warehouses()).with_where(Expr::binary(
            BinaryOp::LessThan,
            warehouses().member("Size", ValueType::Int32),
            Expr::constant(10),
        ));

        let compiled = compile(&model);
        assert_eq!(compiled.return_types, vec![ValueType::String, ValueType::Int32]);
    }

    #[test]
    fn test_keyless_join_without_relationship_is_unsupported() {
        let things = QuerySource::entity(1, "t", "Warehouse");
        let model = QueryModel::from_source(warehouses()).with_join(JoinClause {
            source: things,
            outer: SourceId(0),
            relationship: None,
            outer_key: None,
            inner_key: None,
        });

        assert!(matches!(
            QueryCompiler::new(schema()).compile(&model),
            Err(CompileError::Unsupported(_))
        ));
    }
}
