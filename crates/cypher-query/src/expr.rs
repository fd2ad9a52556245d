//! Expression tree shared by the binder input and the query IR.
//!
//! Input trees arrive from the object-query front end using the general
//! node kinds (members, source references, method calls, ...). The binder
//! rewrites them into the IR vocabulary: `Storage`, `Alias`, `IsNull` and
//! nested reads. One enum carries both so constants, operators and
//! conditionals pass through binding without conversion.

use crate::ir::{NodePattern, ReadOnlyExpression};
use crate::metadata::PropertyRef;
use crate::model::QueryModel;
use crate::types::{Value, ValueType};
use std::fmt;
use std::sync::Arc;

/// Identity of one logical data source in a query model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Stable syntactic key for a member: owning type plus member name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
}

impl MemberKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// A member accessed on some target expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub value_type: ValueType,
}

impl MemberRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            value_type,
        }
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(self.owner.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Coalesce,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    ExclusiveOr,
    And,
    Or,
    AndAlso,
    OrElse,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }

    /// Fixed operator symbol; `None` for coalesce, which renders as a function
    pub fn symbol(self) -> Option<&'static str> {
        match self {
            BinaryOp::Coalesce => None,
            BinaryOp::Equal => Some(" = "),
            BinaryOp::NotEqual => Some(" <> "),
            BinaryOp::GreaterThan => Some(" > "),
            BinaryOp::GreaterThanOrEqual => Some(" >= "),
            BinaryOp::LessThan => Some(" < "),
            BinaryOp::LessThanOrEqual => Some(" <= "),
            BinaryOp::And | BinaryOp::AndAlso => Some(" AND "),
            BinaryOp::Or | BinaryOp::OrElse => Some(" OR "),
            BinaryOp::Add => Some(" + "),
            BinaryOp::Subtract => Some(" - "),
            BinaryOp::Multiply => Some(" * "),
            BinaryOp::Divide => Some(" / "),
            BinaryOp::Modulo => Some(" % "),
            BinaryOp::ExclusiveOr => Some(" ^ "),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    /// Result is lifted to nullable when an operand is null
    pub lifted_to_null: bool,
    /// Custom operator/equality method marker
    pub method: Option<String>,
    /// Conversion applied to the left side of a coalesce
    pub conversion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpr {
    pub test: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Box<Expr>,
    pub value_type: ValueType,
}

/// Bound reference to one property of a pattern node.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageExpr {
    pub name: String,
    pub property: PropertyRef,
    pub node: Arc<NodePattern>,
}

/// An expression with an output name.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasExpr {
    pub alias: Option<String>,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant {
        value: Value,
        value_type: ValueType,
    },
    Parameter {
        name: String,
        value_type: ValueType,
    },
    /// Reference to the current item of a data source
    SourceRef {
        source: SourceId,
        value_type: ValueType,
    },
    Member {
        target: Box<Expr>,
        member: MemberRef,
    },
    Binary(BinaryExpr),
    Conditional(ConditionalExpr),
    Convert {
        operand: Box<Expr>,
        value_type: ValueType,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    MethodCall {
        target: Option<Box<Expr>>,
        method: String,
        arguments: Vec<Expr>,
        value_type: ValueType,
    },
    /// Object construction, e.g. an anonymous projection
    New {
        type_name: String,
        members: Vec<(String, Expr)>,
    },
    SubQuery(Box<QueryModel>),
    /// Provider node this compiler does not know
    Extension {
        name: String,
        value_type: ValueType,
    },
    /// Tuple/record members compared structurally
    MemberSequence(Vec<Expr>),
    Storage(StorageExpr),
    Alias(AliasExpr),
    IsNull(Box<Expr>),
    /// A nested read used as a value or clause
    Read(Box<ReadOnlyExpression>),
}

impl Expr {
    /// Constant typed by the value's runtime type. Use `Expr::null` for nulls.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let value_type = value.runtime_type().unwrap_or(ValueType::Object);
        Expr::Constant { value, value_type }
    }

    pub fn typed_constant(value: impl Into<Value>, value_type: ValueType) -> Self {
        Expr::Constant {
            value: value.into(),
            value_type,
        }
    }

    pub fn null(value_type: ValueType) -> Self {
        Expr::Constant {
            value: Value::Null,
            value_type,
        }
    }

    pub fn parameter(name: impl Into<String>, value_type: ValueType) -> Self {
        Expr::Parameter {
            name: name.into(),
            value_type,
        }
    }

    pub fn source(source: SourceId, value_type: ValueType) -> Self {
        Expr::SourceRef { source, value_type }
    }

    pub fn member(target: Expr, member: MemberRef) -> Self {
        Expr::Member {
            target: Box::new(target),
            member,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            lifted_to_null: false,
            method: None,
            conversion: None,
        })
    }

    pub fn equal(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Equal, left, right)
    }

    pub fn not_equal(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::NotEqual, left, right)
    }

    pub fn and_also(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::AndAlso, left, right)
    }

    pub fn or_else(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::OrElse, left, right)
    }

    pub fn coalesce(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Coalesce, left, right)
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        let value_type = if_true.value_type();
        Expr::Conditional(ConditionalExpr {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            value_type,
        })
    }

    pub fn convert(operand: Expr, value_type: ValueType) -> Self {
        Expr::Convert {
            operand: Box::new(operand),
            value_type,
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Not(Box::new(operand))
    }

    pub fn is_null(operand: Expr) -> Self {
        Expr::IsNull(Box::new(operand))
    }

    pub fn alias(alias: impl Into<String>, expr: Expr) -> Self {
        Expr::Alias(AliasExpr {
            alias: Some(alias.into()),
            expr: Box::new(expr),
        })
    }

    pub fn new_object(type_name: impl Into<String>, members: Vec<(String, Expr)>) -> Self {
        Expr::New {
            type_name: type_name.into(),
            members,
        }
    }

    /// Node kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant { .. } => "constant",
            Expr::Parameter { .. } => "parameter",
            Expr::SourceRef { .. } => "source reference",
            Expr::Member { .. } => "member access",
            Expr::Binary(_) => "binary",
            Expr::Conditional(_) => "conditional",
            Expr::Convert { .. } => "convert",
            Expr::Not(_) => "not",
            Expr::Negate(_) => "negate",
            Expr::MethodCall { .. } => "method call",
            Expr::New { .. } => "new object",
            Expr::SubQuery(_) => "subquery",
            Expr::Extension { .. } => "extension",
            Expr::MemberSequence(_) => "member sequence",
            Expr::Storage(_) => "storage",
            Expr::Alias(_) => "alias",
            Expr::IsNull(_) => "is null",
            Expr::Read(_) => "nested read",
        }
    }

    /// Semantic type of the expression.
    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Constant { value_type, .. }
            | Expr::Parameter { value_type, .. }
            | Expr::SourceRef { value_type, .. }
            | Expr::Convert { value_type, .. }
            | Expr::MethodCall { value_type, .. }
            | Expr::Extension { value_type, .. } => value_type.clone(),
            Expr::Member { member, .. } => member.value_type.clone(),
            Expr::Binary(binary) => binary_type(binary),
            Expr::Conditional(conditional) => conditional.value_type.clone(),
            Expr::Not(operand) | Expr::Negate(operand) => operand.value_type(),
            Expr::New { .. } | Expr::SubQuery(_) => ValueType::Object,
            Expr::MemberSequence(_) => ValueType::MemberSequence,
            Expr::Storage(storage) => storage.property.value_type().clone(),
            Expr::Alias(alias) => alias.expr.value_type(),
            Expr::IsNull(_) => ValueType::Bool,
            Expr::Read(read) => match read.return_items() {
                [single] => single.value_type(),
                _ => ValueType::Object,
            },
        }
    }

    /// Strip conversion layers.
    pub fn remove_convert(&self) -> &Expr {
        let mut current = self;
        while let Expr::Convert { operand, .. } = current {
            current = operand;
        }
        current
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(
            self.remove_convert(),
            Expr::Constant {
                value: Value::Null,
                ..
            }
        )
    }

    pub fn is_member_sequence(&self) -> bool {
        matches!(self.remove_convert(), Expr::MemberSequence(_))
    }

    /// A single, non-composite value.
    pub fn is_simple(&self) -> bool {
        match self {
            Expr::Constant { .. } | Expr::Parameter { .. } | Expr::Storage(_) => true,
            Expr::Convert { operand, .. } => operand.is_simple(),
            Expr::Alias(alias) => alias.expr.is_simple(),
            _ => false,
        }
    }

    /// Output name of a return item: its alias, or its storage name.
    pub fn storage_name(&self) -> Option<&str> {
        match self.remove_convert() {
            Expr::Alias(alias) => alias.alias.as_deref(),
            Expr::Storage(storage) => Some(&storage.name),
            _ => None,
        }
    }

    /// Inner expression of an alias, otherwise self.
    pub fn unaliased(&self) -> &Expr {
        match self {
            Expr::Alias(alias) => &alias.expr,
            other => other,
        }
    }

    /// Whether `needle` is the root of this member-access chain.
    fn is_rooted_at(&self, needle: &Expr) -> bool {
        let mut current = self.remove_convert();
        loop {
            if current == needle {
                return true;
            }
            match current {
                Expr::Member { target, .. } => current = target.remove_convert(),
                _ => return false,
            }
        }
    }
}

fn binary_type(binary: &BinaryExpr) -> ValueType {
    match binary.op {
        op if op.is_comparison() => {
            if binary.lifted_to_null {
                ValueType::nullable(ValueType::Bool)
            } else {
                ValueType::Bool
            }
        }
        BinaryOp::AndAlso | BinaryOp::OrElse => ValueType::Bool,
        BinaryOp::Coalesce => binary.right.value_type(),
        _ => binary.left.value_type(),
    }
}

/// Detect a conditional that only guards a member access against null.
///
/// Matches `x != null ? <x...> : null` and `x == null ? null : <x...>`,
/// where `<x...>` is a member chain rooted at `x`. Returns the guarded
/// result.
pub fn null_propagation_candidate(conditional: &ConditionalExpr) -> Option<&Expr> {
    let Expr::Binary(test) = conditional.test.remove_convert() else {
        return None;
    };

    let guarded = if test.right.is_null_constant() {
        test.left.remove_convert()
    } else if test.left.is_null_constant() {
        test.right.remove_convert()
    } else {
        return None;
    };

    let (result, other) = match test.op {
        BinaryOp::NotEqual => (&*conditional.if_true, &*conditional.if_false),
        BinaryOp::Equal => (&*conditional.if_false, &*conditional.if_true),
        _ => return None,
    };

    if other.is_null_constant()
        && result.remove_convert() != guarded
        && result.is_rooted_at(guarded)
    {
        Some(result)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(target: Expr) -> Expr {
        Expr::member(target, MemberRef::new("Address", "City", ValueType::String))
    }

    fn address() -> Expr {
        Expr::member(
            Expr::source(SourceId(0), ValueType::Entity("Warehouse".into())),
            MemberRef::new("Warehouse", "Address", ValueType::Entity("Address".into())),
        )
    }

    #[test]
    fn test_comparison_is_bool() {
        let expr = Expr::equal(Expr::constant(1), Expr::constant(2));
        assert_eq!(expr.value_type(), ValueType::Bool);
    }

    #[test]
    fn test_arithmetic_takes_left_type() {
        let expr = Expr::binary(BinaryOp::Add, Expr::constant(1i64), Expr::constant(2i64));
        assert_eq!(expr.value_type(), ValueType::Int64);
    }

    #[test]
    fn test_remove_convert_strips_all_layers() {
        let inner = Expr::constant(1);
        let wrapped = Expr::convert(
            Expr::convert(inner.clone(), ValueType::nullable(ValueType::Int32)),
            ValueType::Object,
        );

        assert_eq!(wrapped.remove_convert(), &inner);
    }

    #[test]
    fn test_null_constant_through_convert() {
        let expr = Expr::convert(Expr::null(ValueType::Object), ValueType::String);
        assert!(expr.is_null_constant());
        assert!(!Expr::constant("x").is_null_constant());
    }

    #[test]
    fn test_is_simple() {
        assert!(Expr::constant(true).is_simple());
        assert!(Expr::alias("a", Expr::constant(1)).is_simple());
        assert!(!Expr::equal(Expr::constant(1), Expr::constant(1)).is_simple());
    }

    #[test]
    fn test_null_propagation_not_equal_shape() {
        let conditional = ConditionalExpr {
            test: Box::new(Expr::not_equal(address(), Expr::null(ValueType::Object))),
            if_true: Box::new(location(address())),
            if_false: Box::new(Expr::null(ValueType::String)),
            value_type: ValueType::String,
        };

        assert_eq!(
            null_propagation_candidate(&conditional),
            Some(&location(address()))
        );
    }

    #[test]
    fn test_null_propagation_equal_shape() {
        let conditional = ConditionalExpr {
            test: Box::new(Expr::equal(Expr::null(ValueType::Object), address())),
            if_true: Box::new(Expr::null(ValueType::String)),
            if_false: Box::new(location(address())),
            value_type: ValueType::String,
        };

        assert!(null_propagation_candidate(&conditional).is_some());
    }

    #[test]
    fn test_not_null_propagation_when_branch_unrelated() {
        let conditional = ConditionalExpr {
            test: Box::new(Expr::not_equal(address(), Expr::null(ValueType::Object))),
            if_true: Box::new(Expr::constant("x")),
            if_false: Box::new(Expr::null(ValueType::String)),
            value_type: ValueType::String,
        };

        assert!(null_propagation_candidate(&conditional).is_none());
    }
}
