//! Validation transform.
//!
//! Checks that a read is well-formed before rendering.

use crate::error::TransformError;
use crate::expr::Expr;
use crate::ir::{ReadOnlyExpression, ReadingClause};
use crate::transform::QueryTransform;
use std::collections::HashSet;

/// Validation transform that checks IR consistency.
pub struct ValidateTransform;

impl QueryTransform for ValidateTransform {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn transform(&self, ir: ReadOnlyExpression) -> Result<ReadOnlyExpression, TransformError> {
        for (index, clause) in ir.reading_clauses().iter().enumerate() {
            if let ReadingClause::Match(clause) = clause {
                let start = &clause.pattern.start;
                if clause.pattern.steps.is_empty() && start.alias.is_none() && start.labels.is_empty()
                {
                    return Err(TransformError::EmptyPattern { index });
                }
                if let Some(predicate) = &clause.predicate {
                    check_storage(predicate)?;
                }
            }
        }

        let mut aliases = HashSet::new();
        for item in ir.return_items() {
            if let Expr::Alias(alias) = item {
                if let Some(name) = &alias.alias {
                    if !aliases.insert(name.as_str()) {
                        return Err(TransformError::DuplicateAlias {
                            alias: name.clone(),
                        });
                    }
                }
            }
            check_storage(item)?;
        }

        for ordering in ir.orderings() {
            check_storage(&ordering.expr)?;
        }

        Ok(ir)
    }
}

/// Every storage expression must point at a node with an alias.
fn check_storage(expr: &Expr) -> Result<(), TransformError> {
    match expr {
        Expr::Storage(storage) => {
            if storage.node.alias.is_none() {
                return Err(TransformError::UnaliasedStorage {
                    property: storage.property.name().to_string(),
                });
            }
            Ok(())
        }
        Expr::Binary(binary) => {
            check_storage(&binary.left)?;
            check_storage(&binary.right)
        }
        Expr::Conditional(conditional) => {
            check_storage(&conditional.test)?;
            check_storage(&conditional.if_true)?;
            check_storage(&conditional.if_false)
        }
        Expr::Convert { operand, .. }
        | Expr::Not(operand)
        | Expr::Negate(operand)
        | Expr::IsNull(operand) => check_storage(operand),
        Expr::Alias(alias) => check_storage(&alias.expr),
        Expr::MemberSequence(items) => items.iter().try_for_each(check_storage),
        Expr::Constant { .. }
        | Expr::Parameter { .. }
        | Expr::SourceRef { .. }
        | Expr::Member { .. }
        | Expr::MethodCall { .. }
        | Expr::New { .. }
        | Expr::SubQuery(_)
        | Expr::Extension { .. }
        | Expr::Read(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::SourceId;
    use crate::ir::{MatchClause, NodePattern, Pattern};
    use crate::metadata::{Model, Property};
    use crate::types::ValueType;

    fn read_with(node: NodePattern) -> ReadOnlyExpression {
        let mut read = ReadOnlyExpression::new();
        read.add_reading_clause(MatchClause::new(Pattern::new(node.shared())).for_source(SourceId(0)));
        read
    }

    fn location(read: &ReadOnlyExpression) -> Expr {
        let model = Model::builder()
            .entity("Warehouse")
            .property(Property::new("Location", ValueType::String))
            .done()
            .build();
        let property = model
            .find_entity("Warehouse")
            .unwrap()
            .property_ref("Location")
            .unwrap();
        read.bind_property(&property, SourceId(0)).unwrap()
    }

    #[test]
    fn test_validate_default_ir() {
        let transform = ValidateTransform;
        let ir = ReadOnlyExpression::default();
        let result = transform.transform(ir);

        assert!(result.is_ok());
    }

    #[test]
    fn test_duplicate_alias() {
        let mut read = read_with(NodePattern::new("w"));
        read.add_return_item(Expr::alias("x", Expr::constant(1)), true);
        read.add_return_item(Expr::alias("x", Expr::constant(2)), true);

        assert_eq!(
            ValidateTransform.transform(read).unwrap_err(),
            TransformError::DuplicateAlias {
                alias: "x".to_string()
            }
        );
    }

    #[test]
    fn test_empty_pattern() {
        let read = read_with(NodePattern::anonymous());

        assert_eq!(
            ValidateTransform.transform(read).unwrap_err(),
            TransformError::EmptyPattern { index: 0 }
        );
    }

    #[test]
    fn test_storage_on_unaliased_node() {
        let mut read = read_with(NodePattern::anonymous().with_label("Warehouse"));
        let location = location(&read);
        read.add_return_item(Expr::alias("Place", location), true);

        assert_eq!(
            ValidateTransform.transform(read).unwrap_err(),
            TransformError::UnaliasedStorage {
                property: "Location".to_string()
            }
        );
    }

    #[test]
    fn test_valid_read_passes_through() {
        let mut read = read_with(NodePattern::new("w").with_label("Warehouse"));
        let location = location(&read);
        read.add_return_item(location, true);

        let validated = ValidateTransform.transform(read.clone()).unwrap();
        assert_eq!(validated, read);
    }
}
