//! Binder: rewrites query-model expressions into IR expressions.
//!
//! Every dispatch returns `Some(translated)` or `None`. `None` is the
//! normal answer for anything that cannot run server-side; the compiler
//! keeps such fragments for client-side evaluation.

use crate::expr::{
    null_propagation_candidate, BinaryExpr, BinaryOp, ConditionalExpr, Expr, MemberRef, SourceId,
};
use crate::metadata::Model;
use crate::registry::{QueryId, SourceRegistry};
use crate::storage::TypeMapper;
use crate::types::{Value, ValueType};
use tracing::{debug, trace};

/// Binds member accesses that refer to an enclosing query.
pub trait OuterQueryBinder {
    fn bind_member(&self, target: &Expr, member: &MemberRef) -> Option<Expr>;
}

/// No enclosing query.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOuterQuery;

impl OuterQueryBinder for NoOuterQuery {
    fn bind_member(&self, _target: &Expr, _member: &MemberRef) -> Option<Expr> {
        None
    }
}

pub struct Binder<'a> {
    registry: &'a mut SourceRegistry,
    schema: &'a Model,
    type_mapper: &'a dyn TypeMapper,
    outer: &'a dyn OuterQueryBinder,
    /// Read the current translation is for
    target: Option<QueryId>,
    in_return: bool,
    top_level_return: bool,
}

impl<'a> Binder<'a> {
    pub fn new(
        registry: &'a mut SourceRegistry,
        schema: &'a Model,
        type_mapper: &'a dyn TypeMapper,
    ) -> Self {
        Self {
            registry,
            schema,
            type_mapper,
            outer: &NoOuterQuery,
            target: None,
            in_return: false,
            top_level_return: false,
        }
    }

    pub fn with_target(mut self, target: QueryId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_outer_binder(mut self, outer: &'a dyn OuterQueryBinder) -> Self {
        self.outer = outer;
        self
    }

    /// Translate a filter or join condition.
    pub fn translate_predicate(&mut self, expr: &Expr) -> Option<Expr> {
        self.translate_in(expr, false)
    }

    /// Translate a value that will be returned.
    pub fn translate_projection(&mut self, expr: &Expr) -> Option<Expr> {
        self.translate_in(expr, true)
    }

    fn translate_in(&mut self, expr: &Expr, in_return: bool) -> Option<Expr> {
        let saved = (self.in_return, self.top_level_return);
        self.in_return = in_return;
        self.top_level_return = in_return;

        let result = self.translate(expr);

        (self.in_return, self.top_level_return) = saved;
        result
    }

    /// Translate one node under the current mode.
    pub fn translate(&mut self, expr: &Expr) -> Option<Expr> {
        match expr {
            // Wrappers keep the top-level marker for their operand
            Expr::Convert { .. } | Expr::Not(_) | Expr::Negate(_) | Expr::New { .. } => {
                self.dispatch(expr)
            }
            _ => {
                let saved = self.top_level_return;
                self.top_level_return = false;
                let result = self.dispatch(expr);
                self.top_level_return = saved;
                result
            }
        }
    }

    fn dispatch(&mut self, expr: &Expr) -> Option<Expr> {
        match expr {
            Expr::Binary(binary) => self.translate_binary(binary),
            Expr::Conditional(conditional) => self.translate_conditional(conditional),
            Expr::Member { target, member } => self.translate_member(target, member),
            Expr::SourceRef { source, value_type } => self.translate_source_ref(*source, value_type),
            Expr::Constant { value, value_type } => self.translate_constant(expr, value, value_type),
            Expr::Convert {
                operand,
                value_type,
            } => {
                let operand = self.translate(operand)?;
                Some(Expr::convert(operand, value_type.clone()))
            }
            Expr::Not(operand) => self.translate(operand).map(Expr::not),
            Expr::IsNull(operand) => self.translate(operand).map(Expr::is_null),
            Expr::MemberSequence(items) => items
                .iter()
                .map(|item| self.translate(item))
                .collect::<Option<Vec<_>>>()
                .map(Expr::MemberSequence),
            Expr::Storage(_) | Expr::Alias(_) => Some(expr.clone()),
            Expr::Negate(_)
            | Expr::MethodCall { .. }
            | Expr::Parameter { .. }
            | Expr::New { .. }
            | Expr::SubQuery(_)
            | Expr::Extension { .. }
            | Expr::Read(_) => {
                debug!(
                    kind = expr.kind(),
                    in_return = self.in_return,
                    top_level = self.top_level_return,
                    "expression is evaluated client-side"
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Binary
    // ------------------------------------------------------------------

    fn translate_binary(&mut self, binary: &BinaryExpr) -> Option<Expr> {
        match binary.op {
            BinaryOp::Coalesce => {
                let left = self.translate(&binary.left)?;
                let right = self.translate(&binary.right)?;
                if left.is_member_sequence() || right.is_member_sequence() {
                    return None;
                }
                Some(rebuild(binary, left, right))
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let compared = self.process_comparison(binary)?;
                unfold_structural(compared)
            }
            BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual
            | BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual => self.process_comparison(binary),
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo
            | BinaryOp::ExclusiveOr
            | BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::AndAlso
            | BinaryOp::OrElse => {
                let left = self.translate(&binary.left)?;
                let right = self.translate(&binary.right)?;
                Some(rebuild(binary, left, right))
            }
        }
    }

    fn process_comparison(&mut self, binary: &BinaryExpr) -> Option<Expr> {
        let left = self.translate(&binary.left)?;
        let right = self.translate(&binary.right)?;

        if left.is_member_sequence() || right.is_member_sequence() {
            // Only equality is defined over member sequences
            return matches!(binary.op, BinaryOp::Equal | BinaryOp::NotEqual)
                .then(|| rebuild(binary, left, right));
        }

        if let Some(null_test) = null_comparison(binary.op, &left, &right) {
            return Some(null_test);
        }

        let (left, right) = widen_nullable(left, right);
        let (left_type, right_type) = (left.value_type(), right.value_type());
        if left_type != right_type {
            debug!(
                left = %left_type,
                right = %right_type,
                "comparison between different types is not translated"
            );
            return None;
        }

        Some(rebuild(binary, left, right))
    }

    // ------------------------------------------------------------------
    // Conditional
    // ------------------------------------------------------------------

    fn translate_conditional(&mut self, conditional: &ConditionalExpr) -> Option<Expr> {
        if let Some(guarded) = null_propagation_candidate(conditional) {
            trace!("null propagation guard removed");
            return self.translate(guarded);
        }

        let test = self.translate(&conditional.test)?;
        let if_true = self.translate(&conditional.if_true)?;
        let if_false = self.translate(&conditional.if_false)?;

        let test = if test.is_simple() {
            Expr::equal(test, Expr::constant(true))
        } else {
            test
        };

        Some(Expr::Conditional(ConditionalExpr {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            value_type: conditional.value_type.clone(),
        }))
    }

    // ------------------------------------------------------------------
    // Members and sources
    // ------------------------------------------------------------------

    fn translate_member(&mut self, target: &Expr, member: &MemberRef) -> Option<Expr> {
        if let Some(bound) = self.bind_member(target, member) {
            return Some(bound);
        }
        if let Some(projected) = self.member_projection(target, member) {
            return Some(projected);
        }
        if let Some(correlated) = self.outer.bind_member(target, member) {
            return Some(correlated);
        }

        debug!(
            owner = %member.owner,
            member = %member.name,
            "member access could not be bound"
        );
        None
    }

    /// Bind `target.member` to a property of the node owning the source.
    ///
    /// When the owning read is not the target read, the bound expression is
    /// also returned by the owning read so the target can refer to it.
    fn bind_member(&mut self, target: &Expr, member: &MemberRef) -> Option<Expr> {
        let Expr::SourceRef { source, value_type } = target.remove_convert() else {
            return None;
        };

        let schema = self.schema;
        let property = schema
            .entity_for_type(value_type)?
            .property_ref(&member.name)?;
        let query = self.registry.try_get_query(*source)?;
        let bound = self
            .registry
            .query(query)?
            .bind_property(&property, *source)?;

        if self.target.is_some_and(|target| target != query) {
            if let Some(owner) = self.registry.query_mut(query) {
                let index = owner.add_return_item(bound.clone(), true);
                trace!(source = %source, index, "promoted bound member to owning read");
            }
        }

        Some(bound)
    }

    fn member_projection(&self, target: &Expr, member: &MemberRef) -> Option<Expr> {
        let Expr::SourceRef { source, .. } = target.remove_convert() else {
            return None;
        };

        let query = self.registry.try_get_query(*source)?;
        self.registry
            .query(query)?
            .return_for_member(&member.key())
            .cloned()
    }

    fn translate_source_ref(&mut self, source: SourceId, value_type: &ValueType) -> Option<Expr> {
        if !self.in_return && self.registry.is_join_source(source) {
            // Join conditions compare keys, never whole entities
            let schema = self.schema;
            let entity = schema.entity_for_type(value_type)?;
            let reference = Expr::source(source, value_type.clone());
            let mut keys: Vec<Expr> = entity
                .primary_key()
                .into_iter()
                .map(|key| {
                    Expr::member(
                        reference.clone(),
                        MemberRef::new(entity.name.clone(), key.name.clone(), key.value_type.clone()),
                    )
                })
                .collect();

            return match keys.len() {
                0 => {
                    debug!(entity = %entity.name, "join source has no primary key");
                    None
                }
                1 => self.translate(&keys.remove(0)),
                _ => self.translate(&Expr::MemberSequence(keys)),
            };
        }

        if self.type_mapper.find_mapping(value_type.storage_type()).is_some() {
            let query = self.registry.try_get_query(source)?;
            if let Some(Expr::Read(_)) = self.registry.query(query)?.return_items().first() {
                debug!(source = %source, "lifting a nested read result is not supported");
            }
        }

        None
    }

    fn translate_constant(&self, expr: &Expr, value: &Value, value_type: &ValueType) -> Option<Expr> {
        if value.is_null() {
            return Some(expr.clone());
        }

        if self.type_mapper.find_mapping(value_type.storage_type()).is_some() {
            Some(expr.clone())
        } else {
            debug!(value_type = %value_type, "constant has no literal mapping");
            None
        }
    }
}

fn rebuild(binary: &BinaryExpr, left: Expr, right: Expr) -> Expr {
    Expr::Binary(BinaryExpr {
        op: binary.op,
        left: Box::new(left),
        right: Box::new(right),
        lifted_to_null: binary.lifted_to_null,
        method: binary.method.clone(),
        conversion: binary.conversion.clone(),
    })
}

/// `x == null` becomes `x IS NULL`; `x != null` becomes `NOT (x IS NULL)`.
fn null_comparison(op: BinaryOp, left: &Expr, right: &Expr) -> Option<Expr> {
    let operand = if right.is_null_constant() {
        left
    } else if left.is_null_constant() {
        right
    } else {
        return None;
    };

    let test = Expr::is_null(strip_nullable_convert(operand).clone());
    match op {
        BinaryOp::Equal => Some(test),
        BinaryOp::NotEqual => Some(Expr::not(test)),
        _ => None,
    }
}

fn strip_nullable_convert(expr: &Expr) -> &Expr {
    match expr {
        Expr::Convert {
            operand,
            value_type: ValueType::Nullable(_),
        } => operand,
        other => other,
    }
}

/// Widen the non-nullable side when the types differ only in nullability.
fn widen_nullable(left: Expr, right: Expr) -> (Expr, Expr) {
    let (left_type, right_type) = (left.value_type(), right.value_type());
    if left_type == right_type || left_type.unwrap_nullable() != right_type.unwrap_nullable() {
        return (left, right);
    }

    if left_type.is_nullable() {
        (left, Expr::convert(right, left_type))
    } else {
        (Expr::convert(left, right_type), right)
    }
}

/// Expand equality over member sequences into pairwise comparisons.
///
/// A bare null on one side is broadcast to every member. Pairs are joined
/// with AND for equality and OR for inequality.
fn unfold_structural(expr: Expr) -> Option<Expr> {
    let Expr::Binary(binary) = &expr else {
        return Some(expr);
    };
    let op = binary.op;

    let (left, right) = match (binary.left.remove_convert(), binary.right.remove_convert()) {
        (Expr::MemberSequence(left), Expr::MemberSequence(right)) => (left.clone(), right.clone()),
        (Expr::MemberSequence(left), null) if null.is_null_constant() => {
            (left.clone(), vec![null.clone(); left.len()])
        }
        (null, Expr::MemberSequence(right)) if null.is_null_constant() => {
            (vec![null.clone(); right.len()], right.clone())
        }
        (Expr::MemberSequence(_), _) | (_, Expr::MemberSequence(_)) => return None,
        _ => return Some(expr),
    };

    if left.is_empty() || left.len() != right.len() {
        debug!(
            left = left.len(),
            right = right.len(),
            "member sequences of different lengths"
        );
        return None;
    }

    let single = left.len() == 1;
    let mut pairs = left.into_iter().zip(right).map(|(left, right)| {
        null_comparison(op, &left, &right).unwrap_or_else(|| Expr::binary(op, left, right))
    });

    let first = pairs.next()?;
    let folded = pairs.fold(first, |acc, pair| match op {
        BinaryOp::NotEqual => Expr::or_else(acc, pair),
        _ => Expr::and_also(acc, pair),
    });

    if single && op == BinaryOp::Equal {
        Some(Expr::and_also(folded, Expr::constant(true)))
    } else {
        Some(folded)
    }
}
