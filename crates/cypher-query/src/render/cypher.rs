//! Cypher generator.
//!
//! Renders a finished read as:
//! - `[OPTIONAL] MATCH <pattern> [WHERE <predicate>]` per reading clause
//! - `RETURN` items, `alias.*`, or the `1` placeholder
//! - trailing `ORDER BY`, `SKIP` and `LIMIT`
//!
//! Identifier quoting and literal text come from the `GenerationHelper`
//! and `TypeMapper` collaborators.

use crate::error::RenderError;
use crate::expr::{BinaryExpr, BinaryOp, ConditionalExpr, Expr};
use crate::ir::{
    HopRange, MatchClause, NodePattern, OrderDirection, Pattern, ReadOnlyExpression,
    ReadingClause, RelationshipDetail, RelationshipDirection, RelationshipPattern,
};
use crate::render::{CommandBuilder, QueryRenderer, RenderedQuery};
use crate::storage::{
    DefaultGenerationHelper, DefaultTypeMapper, GenerationHelper, TypeMapper, TypeMapping,
};
use crate::types::{Value, ValueType};
use cypher_config::GenerationConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Raw identifiers: node aliases, labels, relationship aliases
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Cypher renderer with pluggable quoting and literal formatting.
pub struct CypherGenerator {
    config: GenerationConfig,
    helper: Arc<dyn GenerationHelper>,
    type_mapper: Arc<dyn TypeMapper>,
    /// Rendered in place of reading clauses when a read has none
    pseudo_match: Option<String>,
    /// Values for parameters referenced by the read
    parameter_values: HashMap<String, JsonValue>,
}

impl Default for CypherGenerator {
    fn default() -> Self {
        Self::new(GenerationConfig::default())
    }
}

impl CypherGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            helper: Arc::new(DefaultGenerationHelper::new(config.identifier_quote)),
            type_mapper: Arc::new(DefaultTypeMapper),
            config,
            pseudo_match: None,
            parameter_values: HashMap::new(),
        }
    }

    pub fn with_helper(mut self, helper: Arc<dyn GenerationHelper>) -> Self {
        self.helper = helper;
        self
    }

    pub fn with_type_mapper(mut self, type_mapper: Arc<dyn TypeMapper>) -> Self {
        self.type_mapper = type_mapper;
        self
    }

    /// Provider text standing in for `MATCH` when a read has no clauses
    pub fn with_pseudo_match(mut self, clause: impl Into<String>) -> Self {
        self.pseudo_match = Some(clause.into());
        self
    }

    pub fn with_parameter_values(mut self, values: HashMap<String, JsonValue>) -> Self {
        self.parameter_values = values;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

impl QueryRenderer for CypherGenerator {
    fn name(&self) -> &str {
        "cypher"
    }

    fn render(&self, ir: &ReadOnlyExpression) -> Result<RenderedQuery, RenderError> {
        debug!(
            clauses = ir.reading_clauses().len(),
            return_items = ir.return_items().len(),
            return_star = ir.is_return_star(),
            "rendering read"
        );

        let mut writer = Writer {
            generator: self,
            out: CommandBuilder::new(self.config.indent.clone()),
            params: HashMap::new(),
            type_hint: None,
            next_parameter: 0,
        };
        writer.render_read(ir)?;

        Ok(RenderedQuery {
            text: writer.out.into_string(),
            params: writer.params,
        })
    }
}

/// Per-render state. A fresh writer per call keeps rendering idempotent.
struct Writer<'g> {
    generator: &'g CypherGenerator,
    out: CommandBuilder,
    params: HashMap<String, JsonValue>,
    /// Mapping inferred from the other side of a comparison
    type_hint: Option<TypeMapping>,
    next_parameter: usize,
}

impl Writer<'_> {
    fn delimit(&self, name: &str) -> String {
        self.generator.helper.delimit_identifier(name)
    }

    // ------------------------------------------------------------------
    // Reads and clauses
    // ------------------------------------------------------------------

    fn render_read(&mut self, ir: &ReadOnlyExpression) -> Result<(), RenderError> {
        if ir.reading_clauses().is_empty() {
            if let Some(pseudo) = &self.generator.pseudo_match {
                self.out.append(pseudo);
            }
        } else {
            for (i, clause) in ir.reading_clauses().iter().enumerate() {
                if i > 0 {
                    self.out.append_line();
                }
                self.render_clause(clause)?;
            }
        }

        if !self.out.is_empty() {
            self.out.append(" ");
        }
        self.out.append("RETURN ");

        let mut emitted = false;
        if ir.is_return_star() {
            let alias = ir
                .return_star_node()
                .and_then(|node| node.alias.as_deref())
                .ok_or(RenderError::NoReturnStarNode)?;
            let star = format!("{}.*", self.delimit(alias));
            self.out.append(&star);
            emitted = true;
        }

        if !ir.return_items().is_empty() {
            if emitted {
                self.out.append(", ");
            }
            self.render_list(ir.return_items())?;
            emitted = true;
        }

        if !emitted {
            self.out.append("1");
        }

        if !ir.orderings().is_empty() {
            self.out.append(" ORDER BY ");
            for (i, ordering) in ir.orderings().iter().enumerate() {
                if i > 0 {
                    self.out.append(", ");
                }
                self.render_expr(&ordering.expr)?;
                if ordering.direction == OrderDirection::Descending {
                    self.out.append(" DESC");
                }
            }
        }

        if let Some(skip) = ir.skip() {
            self.out.append(" SKIP ");
            self.render_expr(skip)?;
        }

        if let Some(limit) = ir.limit() {
            self.out.append(" LIMIT ");
            self.render_expr(limit)?;
        }

        Ok(())
    }

    fn render_clause(&mut self, clause: &ReadingClause) -> Result<(), RenderError> {
        match clause {
            ReadingClause::Match(clause) => self.render_match(clause),
            ReadingClause::Read { .. } => Err(RenderError::NestedRead),
        }
    }

    fn render_match(&mut self, clause: &MatchClause) -> Result<(), RenderError> {
        if clause.optional {
            self.out.append("OPTIONAL ");
        }
        self.out.append("MATCH ");
        self.render_pattern(&clause.pattern)?;

        if let Some(predicate) = &clause.predicate {
            self.out.append_line().append("WHERE ");
            self.render_expr(predicate)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn render_pattern(&mut self, pattern: &Pattern) -> Result<(), RenderError> {
        self.render_node(&pattern.start)?;
        for (relationship, node) in &pattern.steps {
            self.render_relationship(relationship)?;
            self.render_node(node)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &NodePattern) -> Result<(), RenderError> {
        self.out.append("(");
        if let Some(alias) = &node.alias {
            check_identifier(alias)?;
            self.out.append(alias);
            for label in &node.labels {
                check_identifier(label)?;
                self.out.append(":").append(label);
            }
        }
        self.out.append(")");
        Ok(())
    }

    fn render_relationship(&mut self, relationship: &RelationshipPattern) -> Result<(), RenderError> {
        let (open, close) = match relationship.direction {
            RelationshipDirection::Both => ("<-", "->"),
            RelationshipDirection::Left => ("<-", "-"),
            RelationshipDirection::Right => ("-", "->"),
            RelationshipDirection::Undirected => ("-", "-"),
        };

        self.out.append(open);
        if let Some(detail) = &relationship.detail {
            self.render_relationship_detail(detail)?;
        }
        self.out.append(close);
        Ok(())
    }

    fn render_relationship_detail(&mut self, detail: &RelationshipDetail) -> Result<(), RenderError> {
        self.out.append("[");
        if let Some(alias) = &detail.alias {
            check_identifier(alias)?;
            self.out.append(alias);
        }
        if !detail.kinds.is_empty() {
            let kinds: Vec<String> = detail.kinds.iter().map(|k| self.delimit(k)).collect();
            let kinds = format!(":{}", kinds.join("|:"));
            self.out.append(&kinds);
        }
        if let Some(range) = &detail.range {
            self.out.append(&render_range(range));
        }
        self.out.append("]");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn render_list(&mut self, items: &[Expr]) -> Result<(), RenderError> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.append(", ");
            }
            self.render_expr(item)?;
        }
        Ok(())
    }

    fn render_expr(&mut self, expr: &Expr) -> Result<(), RenderError> {
        match expr {
            Expr::Binary(binary) => self.render_binary(binary),
            Expr::Conditional(conditional) => self.render_conditional(conditional),
            Expr::Constant { value, value_type } => self.render_constant(value, value_type),
            Expr::Parameter { name, .. } => self.render_parameter(name),
            Expr::Convert { operand, .. } => self.render_expr(operand),
            Expr::IsNull(operand) => {
                self.render_expr(operand)?;
                self.out.append(" IS NULL");
                Ok(())
            }
            Expr::Not(operand) => match operand.as_ref() {
                Expr::IsNull(inner) => {
                    self.render_expr(inner)?;
                    self.out.append(" IS NOT NULL");
                    Ok(())
                }
                other => {
                    self.out.append("NOT (");
                    self.render_expr(other)?;
                    self.out.append(")");
                    Ok(())
                }
            },
            Expr::Storage(storage) => {
                let alias = storage.node.alias.as_deref().ok_or_else(|| {
                    RenderError::UnaliasedNode {
                        property: storage.property.name().to_string(),
                    }
                })?;
                let text = format!("{}.{}", self.delimit(alias), self.delimit(&storage.name));
                self.out.append(&text);
                Ok(())
            }
            Expr::Alias(alias) => {
                self.render_expr(&alias.expr)?;
                if let Some(name) = &alias.alias {
                    let text = format!("{}{}", self.generator.config.alias_separator, self.delimit(name));
                    self.out.append(&text);
                }
                Ok(())
            }
            Expr::Read(_) => Err(RenderError::NestedRead),
            Expr::SourceRef { .. }
            | Expr::Member { .. }
            | Expr::Negate(_)
            | Expr::MethodCall { .. }
            | Expr::New { .. }
            | Expr::SubQuery(_)
            | Expr::Extension { .. }
            | Expr::MemberSequence(_) => Err(RenderError::UnsupportedExpression { kind: expr.kind() }),
        }
    }

    fn render_binary(&mut self, binary: &BinaryExpr) -> Result<(), RenderError> {
        let Some(symbol) = binary.op.symbol() else {
            self.out.append("coalesce(");
            self.render_expr(&binary.left)?;
            self.out.append(", ");
            self.render_expr(&binary.right)?;
            self.out.append(")");
            return Ok(());
        };

        let saved_hint = self.type_hint.clone();
        if binary.op.is_comparison() || binary.op == BinaryOp::Add {
            self.type_hint = self
                .infer_mapping(&binary.left)
                .or_else(|| self.infer_mapping(&binary.right))
                .or_else(|| saved_hint.clone());
        }

        // The right side reuses the left side's grouping decision
        let parenthesize = needs_parentheses(&binary.left);

        self.render_operand(&binary.left, parenthesize)?;
        self.out.append(symbol);
        self.render_operand(&binary.right, parenthesize)?;

        self.type_hint = saved_hint;
        Ok(())
    }

    fn render_operand(&mut self, operand: &Expr, parenthesize: bool) -> Result<(), RenderError> {
        if parenthesize {
            self.out.append("(");
        }
        self.render_expr(operand)?;
        if parenthesize {
            self.out.append(")");
        }
        Ok(())
    }

    fn infer_mapping(&self, expr: &Expr) -> Option<TypeMapping> {
        match expr.remove_convert() {
            Expr::Storage(storage) => self.generator.type_mapper.mapping_for_property(&storage.property),
            Expr::Alias(alias) => self.infer_mapping(&alias.expr),
            _ => None,
        }
    }

    fn render_conditional(&mut self, conditional: &ConditionalExpr) -> Result<(), RenderError> {
        if conditional.value_type.is_bool() {
            return self.render_expr(&conditional.test);
        }

        self.out.append("CASE").append_line().increment_indent();
        self.out.append("WHEN ");
        self.render_expr(&conditional.test)?;
        self.out.append_line().append("THEN ");
        self.render_branch(&conditional.if_true)?;
        self.out.append(" ELSE ");
        self.render_branch(&conditional.if_false)?;
        self.out.decrement_indent().append_line().append("END");
        Ok(())
    }

    fn render_branch(&mut self, branch: &Expr) -> Result<(), RenderError> {
        match branch.remove_convert() {
            Expr::Constant {
                value: Value::Bool(flag),
                ..
            } => {
                let config = &self.generator.config;
                let token = if *flag {
                    &config.true_literal
                } else {
                    &config.false_literal
                };
                self.out.append(token);
                Ok(())
            }
            other => self.render_expr(other),
        }
    }

    fn render_constant(&mut self, value: &Value, value_type: &ValueType) -> Result<(), RenderError> {
        if value.is_null() {
            self.out.append("null");
            return Ok(());
        }

        let underlying = match value_type.unwrap_nullable() {
            ValueType::Enum { underlying, .. } => Some(underlying.as_ref()),
            _ => None,
        };
        let value = value.unwrap_enum(underlying);

        if self.generator.config.parameterize_literals {
            let name = format!("{}{}", self.generator.config.parameter_prefix, self.next_parameter);
            self.next_parameter += 1;
            self.out.append(&format!("${}", name));
            self.params.insert(name, value.to_json());
            return Ok(());
        }

        let mapping = match &self.type_hint {
            Some(hint) if hint.accepts(&value) => Some(hint.clone()),
            _ => self.generator.type_mapper.mapping_for_value(&value),
        };
        let literal = mapping
            .and_then(|mapping| mapping.generate_literal(&value))
            .ok_or_else(|| RenderError::NoLiteralMapping {
                value_type: value_type.to_string(),
            })?;

        self.out.append(&literal);
        Ok(())
    }

    fn render_parameter(&mut self, name: &str) -> Result<(), RenderError> {
        let value = self
            .generator
            .parameter_values
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::MissingParameter {
                name: name.to_string(),
            })?;

        self.out.append(&format!("${}", name));
        self.params.insert(name.to_string(), value);
        Ok(())
    }
}

/// A side needs grouping when it is itself a non-coalesce binary.
fn needs_parentheses(operand: &Expr) -> bool {
    matches!(
        operand.remove_convert(),
        Expr::Binary(BinaryExpr { op, .. }) if *op != BinaryOp::Coalesce
    )
}

fn render_range(range: &HopRange) -> String {
    let lower = range.lower.map(|n| n.to_string()).unwrap_or_default();
    let upper = range.upper.map(|n| n.to_string()).unwrap_or_default();
    format!("*{}..{}", lower, upper)
}

fn check_identifier(name: &str) -> Result<(), RenderError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(RenderError::InvalidIdentifier {
            name: name.to_string(),
            reason: "must be a letter or underscore followed by letters, digits or underscores"
                .to_string(),
        })
    }
}
