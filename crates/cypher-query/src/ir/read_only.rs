//! One compiled read: reading clauses plus what they return.

use super::clause::{MatchClause, Ordering, ReadingClause};
use super::pattern::NodePattern;
use crate::expr::{AliasExpr, Expr, MemberKey, SourceId, StorageExpr};
use crate::metadata::PropertyRef;
use crate::types::ValueType;
use std::collections::HashMap;
use std::sync::Arc;

/// Fallback name for return items with no name of their own
pub const DEFAULT_ALIAS_PREFIX: &str = "s";

/// A graph read under construction.
///
/// Built once per data source by the registry and mutated while the binder
/// runs. Once handed to the generator it is treated as finished.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOnlyExpression {
    reading_clauses: Vec<ReadingClause>,
    return_items: Vec<Expr>,
    orderings: Vec<Ordering>,
    limit: Option<Expr>,
    skip: Option<Expr>,
    return_star: bool,
    return_star_node: Option<Arc<NodePattern>>,
    member_projections: HashMap<MemberKey, Expr>,
    alias_prefix: String,
}

impl Default for ReadOnlyExpression {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadOnlyExpression {
    pub fn new() -> Self {
        Self {
            reading_clauses: Vec::new(),
            return_items: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            skip: None,
            return_star: false,
            return_star_node: None,
            member_projections: HashMap::new(),
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_string(),
        }
    }

    pub fn with_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    // ------------------------------------------------------------------
    // Reading clauses
    // ------------------------------------------------------------------

    pub fn reading_clauses(&self) -> &[ReadingClause] {
        &self.reading_clauses
    }

    /// Append a clause. Clause order is traversal order.
    pub fn add_reading_clause(&mut self, clause: impl Into<ReadingClause>) {
        self.reading_clauses.push(clause.into());
    }

    /// The last plain `MATCH` clause, where predicates are attached.
    pub fn last_match_mut(&mut self) -> Option<&mut MatchClause> {
        self.reading_clauses
            .iter_mut()
            .rev()
            .find_map(|clause| match clause {
                ReadingClause::Match(m) => Some(m),
                ReadingClause::Read { .. } => None,
            })
    }

    /// Node producing the items of `source`.
    ///
    /// The first clause registered for the source wins. Without one, the
    /// return-star node is used.
    pub fn node_for_source(&self, source: SourceId) -> Option<&Arc<NodePattern>> {
        match self
            .reading_clauses
            .iter()
            .find(|clause| clause.source() == Some(source))
        {
            Some(clause) => clause.node(),
            None => self.return_star_node(),
        }
    }

    /// Bind `property` of the items of `source` to a storage expression.
    pub fn bind_property(&self, property: &PropertyRef, source: SourceId) -> Option<Expr> {
        self.node_for_source(source).map(|node| {
            Expr::Storage(StorageExpr {
                name: property.storage_name().to_string(),
                property: property.clone(),
                node: Arc::clone(node),
            })
        })
    }

    // ------------------------------------------------------------------
    // Return items
    // ------------------------------------------------------------------

    pub fn return_items(&self) -> &[Expr] {
        &self.return_items
    }

    pub fn is_return_star(&self) -> bool {
        self.return_star
    }

    pub fn set_return_star(&mut self, return_star: bool) {
        self.return_star = return_star;
    }

    /// Node rendered as `alias.*`: the explicit override, or the only
    /// clause's node when there is exactly one.
    pub fn return_star_node(&self) -> Option<&Arc<NodePattern>> {
        if let Some(node) = &self.return_star_node {
            return Some(node);
        }
        match self.reading_clauses.as_slice() {
            [single] => single.node(),
            _ => None,
        }
    }

    pub fn set_return_star_node(&mut self, node: Arc<NodePattern>) {
        self.return_star_node = Some(node);
    }

    /// Add a return item, returning its index.
    ///
    /// Structurally equal items (or aliased items wrapping an equal
    /// expression) are reused. Appending clears return-star unless
    /// `reset_star` is false.
    pub fn add_return_item(&mut self, expr: Expr, reset_star: bool) -> usize {
        let expr = strip_nullable_widening(expr);

        if let Some(index) = self
            .return_items
            .iter()
            .position(|item| item == &expr || is_alias_of(item, &expr))
        {
            return index;
        }

        self.return_items.push(expr);
        if reset_star {
            self.return_star = false;
        }
        self.return_items.len() - 1
    }

    /// Truncate the return list at `index`.
    pub fn remove_range_from_return(&mut self, index: usize) {
        self.return_items.truncate(index);
    }

    /// Semantic types of the rows this read produces.
    pub fn return_types(&self) -> Vec<ValueType> {
        if !self.return_items.is_empty() || !self.return_star {
            return self
                .return_items
                .iter()
                .map(|item| match item.unaliased() {
                    Expr::Convert {
                        operand,
                        value_type: ValueType::Object,
                    } => operand.value_type(),
                    other => other.value_type(),
                })
                .collect();
        }

        self.reading_clauses
            .iter()
            .filter_map(|clause| match clause {
                ReadingClause::Read { query, .. } => Some(query.return_types()),
                ReadingClause::Match(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Give `expr` a return name unique within this read.
    ///
    /// The name is `alias_hint`, else the expression's own name, else the
    /// default prefix; case-sensitive collisions get the smallest unused
    /// numeric suffix. The expression is wrapped in an alias only when the
    /// chosen name differs from its current one, ignoring case. If `expr`
    /// was already a return item it is replaced in place.
    pub fn create_unique_return(&mut self, expr: Expr, alias_hint: Option<&str>) -> Expr {
        let position = self.return_items.iter().position(|item| item == &expr);
        if let Some(index) = position {
            self.return_items.remove(index);
        }

        let current = expr.storage_name().map(str::to_string);
        let base = alias_hint
            .map(str::to_string)
            .or_else(|| current.clone())
            .unwrap_or_else(|| self.alias_prefix.clone());

        let mut name = base.clone();
        let mut suffix = 0usize;
        while self
            .return_items
            .iter()
            .any(|item| item.storage_name() == Some(name.as_str()))
        {
            name = format!("{}{}", base, suffix);
            suffix += 1;
        }

        let renamed = match &current {
            Some(current) => !current.eq_ignore_ascii_case(&name),
            None => true,
        };

        let result = if renamed {
            let inner = match expr {
                Expr::Alias(AliasExpr { expr: inner, .. }) => *inner,
                other => other,
            };
            Expr::alias(name, inner)
        } else {
            expr
        };

        if let Some(index) = position {
            self.return_items.insert(index, result.clone());
        }

        result
    }

    // ------------------------------------------------------------------
    // Member projections
    // ------------------------------------------------------------------

    /// Projection previously registered for a member, unaliased.
    pub fn return_for_member(&self, key: &MemberKey) -> Option<&Expr> {
        self.member_projections.get(key)
    }

    /// Name the return item for `key` after the member and remember it.
    ///
    /// `expr` should already be a return item; the aliased form is
    /// returned.
    pub fn set_return_for_member(&mut self, key: MemberKey, expr: Expr) -> Expr {
        let aliased = self.create_unique_return(expr, Some(&key.name));
        self.member_projections
            .insert(key, aliased.unaliased().clone());
        aliased
    }

    // ------------------------------------------------------------------
    // Ordering, limit and skip
    // ------------------------------------------------------------------

    pub fn orderings(&self) -> &[Ordering] {
        &self.orderings
    }

    pub fn add_ordering(&mut self, ordering: Ordering) {
        self.orderings.push(ordering);
    }

    pub fn limit(&self) -> Option<&Expr> {
        self.limit.as_ref()
    }

    pub fn set_limit(&mut self, limit: Option<Expr>) {
        self.limit = limit;
    }

    pub fn skip(&self) -> Option<&Expr> {
        self.skip.as_ref()
    }

    pub fn set_skip(&mut self, skip: Option<Expr>) {
        self.skip = skip;
    }
}

/// `Convert(x, T?)` where `x: T` adds nothing to a return item.
fn strip_nullable_widening(expr: Expr) -> Expr {
    match expr {
        Expr::Convert {
            operand,
            value_type: ValueType::Nullable(inner),
        } if operand.value_type() == *inner => *operand,
        other => other,
    }
}

fn is_alias_of(item: &Expr, expr: &Expr) -> bool {
    matches!(item, Expr::Alias(alias) if alias.expr.as_ref() == expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Pattern;
    use crate::metadata::{Model, Property};

    fn warehouse() -> Model {
        Model::builder()
            .entity("Warehouse")
            .property(Property::new("Location", ValueType::String))
            .property(Property::new("Size", ValueType::Int32))
            .done()
            .build()
    }

    fn read_with_match() -> ReadOnlyExpression {
        let mut read = ReadOnlyExpression::new();
        read.add_reading_clause(
            MatchClause::new(Pattern::new(
                NodePattern::new("w").with_label("Warehouse").shared(),
            ))
            .for_source(SourceId(0)),
        );
        read
    }

    fn storage(read: &ReadOnlyExpression, name: &str) -> Expr {
        let model = warehouse();
        let property = model
            .find_entity("Warehouse")
            .unwrap()
            .property_ref(name)
            .unwrap();
        read.bind_property(&property, SourceId(0)).unwrap()
    }

    // ========================================================================
    // AddReturnItem
    // ========================================================================

    #[test]
    fn test_add_return_item_is_idempotent() {
        let mut read = read_with_match();
        let location = storage(&read, "Location");

        assert_eq!(read.add_return_item(location.clone(), true), 0);
        assert_eq!(read.add_return_item(location, true), 0);
        assert_eq!(read.return_items().len(), 1);
    }

    #[test]
    fn test_add_return_item_matches_aliased_item() {
        let mut read = read_with_match();
        let location = storage(&read, "Location");

        read.add_return_item(location.clone(), true);
        read.create_unique_return(location.clone(), Some("Place"));

        assert_eq!(read.add_return_item(location, true), 0);
        assert_eq!(read.return_items().len(), 1);
    }

    #[test]
    fn test_add_return_item_strips_nullable_widening() {
        let mut read = read_with_match();
        let size = storage(&read, "Size");
        let widened = Expr::convert(size.clone(), ValueType::nullable(ValueType::Int32));

        read.add_return_item(size, true);
        assert_eq!(read.add_return_item(widened, true), 0);
    }

    #[test]
    fn test_add_return_item_resets_star() {
        let mut read = read_with_match();
        read.set_return_star(true);

        read.add_return_item(Expr::constant(1), false);
        assert!(read.is_return_star());

        read.add_return_item(Expr::constant(2), true);
        assert!(!read.is_return_star());
    }

    // ========================================================================
    // Node resolution
    // ========================================================================

    #[test]
    fn test_node_for_unknown_source_falls_back_to_single_clause() {
        let read = read_with_match();

        let node = read.node_for_source(SourceId(42)).unwrap();
        assert_eq!(node.alias.as_deref(), Some("w"));
    }

    #[test]
    fn test_node_for_source_without_fallback() {
        let mut read = read_with_match();
        read.add_reading_clause(
            MatchClause::new(Pattern::new(NodePattern::new("t").shared()))
                .for_source(SourceId(1)),
        );

        assert_eq!(
            read.node_for_source(SourceId(1)).unwrap().alias.as_deref(),
            Some("t")
        );
        assert!(read.node_for_source(SourceId(42)).is_none());
    }

    #[test]
    fn test_bind_property_shares_node() {
        let read = read_with_match();
        let Expr::Storage(bound) = storage(&read, "Location") else {
            panic!("expected storage expression");
        };

        assert!(Arc::ptr_eq(&bound.node, read.node_for_source(SourceId(0)).unwrap()));
        assert_eq!(bound.name, "Location");
    }

    // ========================================================================
    // CreateUniqueReturn
    // ========================================================================

    #[test]
    fn test_create_unique_return_suffixes_collisions() {
        let mut read = read_with_match();
        read.add_return_item(Expr::alias("x", Expr::constant(1)), true);
        read.add_return_item(Expr::alias("x0", Expr::constant(2)), true);

        let third = Expr::constant(3);
        read.add_return_item(third.clone(), true);
        let aliased = read.create_unique_return(third, Some("x"));

        assert_eq!(aliased.storage_name(), Some("x1"));
        assert_eq!(read.return_items()[2], aliased);
    }

    #[test]
    fn test_create_unique_return_keeps_own_name() {
        let mut read = read_with_match();
        let location = storage(&read, "Location");
        read.add_return_item(location.clone(), true);

        let result = read.create_unique_return(location.clone(), None);
        assert_eq!(result, location);
    }

    #[test]
    fn test_create_unique_return_ignores_case_of_current_name() {
        let mut read = read_with_match();
        let location = storage(&read, "Location");

        let result = read.create_unique_return(location.clone(), Some("location"));
        assert_eq!(result, location);
    }

    #[test]
    fn test_create_unique_return_default_prefix() {
        let mut read = read_with_match();
        read.add_return_item(Expr::alias("s", Expr::constant(1)), true);

        let result = read.create_unique_return(Expr::constant(5), None);
        assert_eq!(result, Expr::alias("s0", Expr::constant(5)));
        // not previously a return item, so not inserted
        assert_eq!(read.return_items().len(), 1);
    }

    #[test]
    fn test_create_unique_return_renames_alias() {
        let mut read = read_with_match();
        let aliased = Expr::alias("a", Expr::constant(1));
        read.add_return_item(aliased.clone(), true);

        let result = read.create_unique_return(aliased, Some("b"));
        assert_eq!(result, Expr::alias("b", Expr::constant(1)));
        assert_eq!(read.return_items(), &[result]);
    }

    // ========================================================================
    // Return types and member projections
    // ========================================================================

    #[test]
    fn test_return_types_unwrap_object_widening() {
        let mut read = read_with_match();
        let size = storage(&read, "Size");
        read.add_return_item(Expr::convert(size, ValueType::Object), true);
        read.add_return_item(storage(&read, "Location"), true);

        assert_eq!(
            read.return_types(),
            vec![ValueType::Int32, ValueType::String]
        );
    }

    #[test]
    fn test_return_types_recurse_into_nested_reads() {
        let mut inner = read_with_match();
        inner.add_return_item(storage(&inner, "Size"), true);

        let mut outer = ReadOnlyExpression::new();
        outer.add_reading_clause(ReadingClause::Read {
            source: Some(SourceId(1)),
            query: Box::new(inner),
        });
        outer.set_return_star(true);

        assert_eq!(outer.return_types(), vec![ValueType::Int32]);
    }

    #[test]
    fn test_set_return_for_member() {
        let mut read = read_with_match();
        let location = storage(&read, "Location");
        read.add_return_item(location.clone(), true);

        let key = MemberKey::new("Summary", "Place");
        let aliased = read.set_return_for_member(key.clone(), location.clone());

        assert_eq!(aliased, Expr::alias("Place", location.clone()));
        assert_eq!(read.return_for_member(&key), Some(&location));
    }

    #[test]
    fn test_remove_range_from_return() {
        let mut read = read_with_match();
        read.add_return_item(Expr::constant(1), true);
        read.add_return_item(Expr::constant(2), true);
        read.add_return_item(Expr::constant(3), true);

        read.remove_range_from_return(1);
        assert_eq!(read.return_items(), &[Expr::constant(1)]);
    }
}
